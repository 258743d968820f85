//! # Perceptual Hashing Module
//!
//! Perceptual hashing generates "fingerprints" that remain similar for visually
//! similar images, unlike cryptographic hashes where minor changes produce
//! completely different outputs.
//!
//! Five algorithms are provided, each looking at a different signal:
//!
//! 1. Average: 8×8 grayscale thumbnail thresholded at its mean
//! 2. Frequency: low 8×8 band of a 32×32 DCT thresholded at its median
//! 3. Gradient: sign of horizontal neighbour differences on a 9×8 thumbnail
//! 4. Wavelet: 8×8 Haar approximation band of a 64×64 thumbnail, median threshold
//! 5. Color: 14-bin hue/saturation histogram quantized to 3 bits per bin
//!
//! Every algorithm downsamples first, so codes are stable across resizing and
//! recompression. Grayscale uses 0.299*R + 0.587*G + 0.114*B throughout.
//!
//! ## Hamming Distance Interpretation (64-bit codes)
//!
//! - 0-3: Nearly identical images (same image with minor modifications)
//! - 4-10: Similar images (same subject with moderate differences)
//! - >10-15: Different images

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array2;
use once_cell::sync::Lazy;
use rustdct::{Dct2, DctPlanner, TransformType2And3};
use std::sync::Arc;

use super::types::{HashAlgorithm, HashCode};
use crate::error::{Error, Result};

const DCT_SIZE: usize = 32;
const WAVELET_SIZE: usize = 64;
const COLOR_BIN_BITS: usize = 3;

static DCT_PLAN: Lazy<Arc<dyn TransformType2And3<f32>>> =
    Lazy::new(|| DctPlanner::<f32>::new().plan_dct2(DCT_SIZE));

/// Compute one algorithm's code for a decoded image
pub fn compute(algorithm: HashAlgorithm, img: &DynamicImage) -> Result<HashCode> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Hash {
            algorithm,
            reason: "image has no pixels".to_string(),
        });
    }

    let code = match algorithm {
        HashAlgorithm::Average => average_hash(img),
        HashAlgorithm::Frequency => frequency_hash(img),
        HashAlgorithm::Gradient => gradient_hash(img),
        HashAlgorithm::Wavelet => wavelet_hash(img),
        HashAlgorithm::Color => color_hash(img),
    };

    if code.len() != algorithm.code_bits() {
        return Err(Error::Hash {
            algorithm,
            reason: format!(
                "produced {} bits, expected {}",
                code.len(),
                algorithm.code_bits()
            ),
        });
    }
    Ok(code)
}

/// Resize to `width`×`height` and return the grayscale grid as rows×columns
fn gray_grid(img: &DynamicImage, width: u32, height: u32) -> Array2<f32> {
    let small = img
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();

    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let pixel = small.get_pixel(x as u32, y as u32);
        0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
    })
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// 64-bit average hash
pub fn average_hash(img: &DynamicImage) -> HashCode {
    let grid = gray_grid(img, 8, 8);
    let mean = grid.sum() / 64.0;
    HashCode::from_bits(grid.iter().map(|&p| p > mean))
}

/// 64-bit DCT hash
pub fn frequency_hash(img: &DynamicImage) -> HashCode {
    let mut grid = gray_grid(img, DCT_SIZE as u32, DCT_SIZE as u32);
    let dct = &*DCT_PLAN;

    // Separable 2D DCT: rows, then columns
    for mut row in grid.rows_mut() {
        let mut buffer = row.to_vec();
        dct.process_dct2(&mut buffer);
        row.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
    }
    for mut column in grid.columns_mut() {
        let mut buffer = column.to_vec();
        dct.process_dct2(&mut buffer);
        column.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
    }

    let low: Vec<f32> = grid.slice(ndarray::s![0..8, 0..8]).iter().copied().collect();
    let threshold = median(&low);
    HashCode::from_bits(low.iter().map(|&c| c > threshold))
}

/// 64-bit difference hash
pub fn gradient_hash(img: &DynamicImage) -> HashCode {
    let grid = gray_grid(img, 9, 8);
    let bits = (0..8).flat_map(|y| (0..8).map(move |x| (y, x)));
    HashCode::from_bits(bits.map(|(y, x)| grid[[y, x + 1]] > grid[[y, x]]))
}

/// One level of the 2D Haar transform, keeping only the approximation band
fn haar_approximation(grid: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = grid.dim();
    Array2::from_shape_fn((rows / 2, cols / 2), |(y, x)| {
        let (y2, x2) = (y * 2, x * 2);
        (grid[[y2, x2]] + grid[[y2, x2 + 1]] + grid[[y2 + 1, x2]] + grid[[y2 + 1, x2 + 1]]) / 2.0
    })
}

/// 64-bit wavelet hash
pub fn wavelet_hash(img: &DynamicImage) -> HashCode {
    let mut grid = gray_grid(img, WAVELET_SIZE as u32, WAVELET_SIZE as u32) / 255.0;
    while grid.nrows() > 8 {
        grid = haar_approximation(&grid);
    }

    let values: Vec<f32> = grid.iter().copied().collect();
    let threshold = median(&values);
    HashCode::from_bits(values.iter().map(|&v| v > threshold))
}

/// Hue in [0, 1) and saturation in [0, 1] for an RGB pixel
fn hue_saturation(r: f32, g: f32, b: f32) -> (f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max <= 0.0 { 0.0 } else { delta / max };
    if delta <= f32::EPSILON {
        return (0.0, saturation);
    }

    let hue = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    ((hue / 6.0).rem_euclid(1.0), saturation)
}

/// 42-bit color hash: black and gray fractions, then six faint and six bright hue bins
pub fn color_hash(img: &DynamicImage) -> HashCode {
    let small = img.resize_exact(32, 32, FilterType::Triangle).to_rgb8();
    let total = (small.width() * small.height()) as f32;

    // [black, gray, faint hues x6, bright hues x6]
    let mut counts = [0f32; 14];
    for pixel in small.pixels() {
        let (r, g, b) = (
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
        );
        let intensity = 0.299 * r + 0.587 * g + 0.114 * b;
        let (hue, saturation) = hue_saturation(r, g, b);
        let hue_bin = ((hue * 6.0) as usize).min(5);

        if intensity < 1.0 / 8.0 {
            counts[0] += 1.0;
        } else if saturation < 1.0 / 3.0 {
            counts[1] += 1.0;
        } else if saturation < 2.0 / 3.0 {
            counts[2 + hue_bin] += 1.0;
        } else {
            counts[8 + hue_bin] += 1.0;
        }
    }

    let max_value = (1usize << COLOR_BIN_BITS) - 1;
    let bits = counts.iter().flat_map(|&count| {
        let level = ((count / total) * (max_value + 1) as f32) as usize;
        let level = level.min(max_value);
        (0..COLOR_BIN_BITS)
            .rev()
            .map(move |shift| (level >> shift) & 1 == 1)
    });
    HashCode::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let fx = x as f32 / width as f32;
            let fy = y as f32 / height as f32;
            Rgb([
                (255.0 * fx) as u8,
                (255.0 * fy) as u8,
                (255.0 * (1.0 - fx) * fy) as u8,
            ])
        }))
    }

    fn checkerboard(width: u32, height: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([240, 30, 30])
            } else {
                Rgb([20, 20, 200])
            }
        }))
    }

    #[test]
    fn test_code_lengths() {
        let img = gradient_image(100, 80);
        for algorithm in HashAlgorithm::ALL {
            let code = compute(algorithm, &img).unwrap();
            assert_eq!(code.len(), algorithm.code_bits(), "{}", algorithm);
        }
    }

    #[test]
    fn test_deterministic() {
        let img = checkerboard(64, 64, 8);
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(
                compute(algorithm, &img).unwrap(),
                compute(algorithm, &img).unwrap()
            );
        }
    }

    #[test]
    fn test_tolerant_to_resize() {
        let original = gradient_image(256, 256);
        let resized = original.resize_exact(200, 200, FilterType::Lanczos3);

        for algorithm in [
            HashAlgorithm::Average,
            HashAlgorithm::Gradient,
            HashAlgorithm::Wavelet,
        ] {
            let a = compute(algorithm, &original).unwrap();
            let b = compute(algorithm, &resized).unwrap();
            let distance = a.distance(&b).unwrap();
            assert!(distance <= 10, "{} distance {}", algorithm, distance);
        }
    }

    #[test]
    fn test_distinguishes_different_images() {
        let a = gradient_image(128, 128);
        let b = checkerboard(128, 128, 16);

        let da = average_hash(&a).distance(&average_hash(&b)).unwrap();
        let dg = gradient_hash(&a).distance(&gradient_hash(&b)).unwrap();
        assert!(da + dg > 20, "average {} gradient {}", da, dg);
    }

    #[test]
    fn test_empty_image_is_hash_error() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            compute(HashAlgorithm::Average, &empty),
            Err(Error::Hash { .. })
        ));
    }

    #[test]
    fn test_hue_saturation() {
        let (h, s) = hue_saturation(1.0, 0.0, 0.0);
        assert!(h.abs() < 1e-6);
        assert!((s - 1.0).abs() < 1e-6);

        let (_, s) = hue_saturation(0.5, 0.5, 0.5);
        assert_eq!(s, 0.0);

        let (h, _) = hue_saturation(0.0, 0.0, 1.0);
        assert!((h - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_color_hash_separates_palettes() {
        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([250, 10, 10])));
        let blue = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([10, 10, 250])));
        assert!(color_hash(&red).distance(&color_hash(&blue)).unwrap() > 0);
    }
}
