//! Fixed-length feature vectors for the similarity index.
//!
//! A vector is the configured perceptual codes as 0/1 floats (in algorithm
//! order) followed by a small visual descriptor:
//!
//! | values | meaning                                   |
//! |--------|-------------------------------------------|
//! | 24     | R, G, B histograms, 8 bins each           |
//! | 1      | edge density (share of strong Sobel edges)|
//! | 1      | texture variance (Laplacian, squashed)    |
//! | 1      | brightness (mean luma)                    |
//! | 1      | contrast (luma standard deviation)        |
//!
//! The result is L2-normalized, so every vector has the same length and unit norm.

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array2;
use std::path::{Path, PathBuf};

use super::decode::decode_image;
use super::hasher::HashComputer;
use super::types::PerceptualHashes;
use crate::error::{Error, Result};

const DESCRIPTOR_SIZE: u32 = 64;
const HISTOGRAM_BINS: usize = 8;
const EDGE_THRESHOLD: f32 = 0.25;

/// Number of descriptor values appended after the hash bits
pub const DESCRIPTOR_LEN: usize = 3 * HISTOGRAM_BINS + 4;

pub struct FeatureExtractor<'a> {
    hasher: &'a HashComputer,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(hasher: &'a HashComputer) -> Self {
        Self { hasher }
    }

    /// Length of every vector this extractor produces
    pub fn dimension(&self) -> usize {
        self.hasher
            .algorithms()
            .iter()
            .map(|a| a.code_bits())
            .sum::<usize>()
            + DESCRIPTOR_LEN
    }

    /// Decode `path` once and build its normalized feature vector
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        let path = path.as_ref();
        let img = decode_image(path).into_result()?;
        let hashes = self.hasher.hashes_from_image(&img)?;
        self.from_parts(&hashes, &img).map_err(|e| e.with_path(path))
    }

    /// Build a vector from hashes and the image they came from.
    ///
    /// Fails rather than returning a shorter vector when any configured
    /// algorithm is missing.
    pub fn from_parts(&self, hashes: &PerceptualHashes, img: &DynamicImage) -> Result<Vec<f32>> {
        let mut vector = Vec::with_capacity(self.dimension());

        for &algorithm in self.hasher.algorithms() {
            let code = hashes.get(algorithm).ok_or_else(|| Error::Hash {
                algorithm,
                reason: "code missing, cannot build a full feature vector".to_string(),
            })?;
            vector.extend(code.to_floats());
        }

        vector.extend(visual_descriptor(img)?);

        if vector.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// Scale to unit L2 norm; all-zero vectors are left alone
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Colour histogram, edge density, texture, brightness and contrast
pub fn visual_descriptor(img: &DynamicImage) -> Result<Vec<f32>> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Decode {
            path: PathBuf::new(),
            reason: "image has no pixels for a visual descriptor".to_string(),
        });
    }

    let small = img
        .resize_exact(DESCRIPTOR_SIZE, DESCRIPTOR_SIZE, FilterType::Triangle)
        .to_rgb8();
    let pixels = (DESCRIPTOR_SIZE * DESCRIPTOR_SIZE) as f32;

    let mut histogram = [0f32; 3 * HISTOGRAM_BINS];
    for pixel in small.pixels() {
        for channel in 0..3 {
            let bin = pixel[channel] as usize * HISTOGRAM_BINS / 256;
            histogram[channel * HISTOGRAM_BINS + bin] += 1.0;
        }
    }
    histogram.iter_mut().for_each(|count| *count /= pixels);

    let size = DESCRIPTOR_SIZE as usize;
    let luma = Array2::from_shape_fn((size, size), |(y, x)| {
        let p = small.get_pixel(x as u32, y as u32);
        (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) / 255.0
    });

    let brightness = luma.sum() / pixels;
    let contrast = (luma.iter().map(|v| (v - brightness).powi(2)).sum::<f32>() / pixels).sqrt();

    let mut strong_edges = 0usize;
    let mut laplacians = Vec::with_capacity((size - 2) * (size - 2));
    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let gx = (luma[[y - 1, x + 1]] + 2.0 * luma[[y, x + 1]] + luma[[y + 1, x + 1]])
                - (luma[[y - 1, x - 1]] + 2.0 * luma[[y, x - 1]] + luma[[y + 1, x - 1]]);
            let gy = (luma[[y + 1, x - 1]] + 2.0 * luma[[y + 1, x]] + luma[[y + 1, x + 1]])
                - (luma[[y - 1, x - 1]] + 2.0 * luma[[y - 1, x]] + luma[[y - 1, x + 1]]);
            if (gx * gx + gy * gy).sqrt() > EDGE_THRESHOLD {
                strong_edges += 1;
            }

            laplacians.push(
                luma[[y - 1, x]] + luma[[y + 1, x]] + luma[[y, x - 1]] + luma[[y, x + 1]]
                    - 4.0 * luma[[y, x]],
            );
        }
    }

    let interior = laplacians.len() as f32;
    let edge_density = strong_edges as f32 / interior;
    let lap_mean = laplacians.iter().sum::<f32>() / interior;
    let lap_variance = laplacians
        .iter()
        .map(|v| (v - lap_mean).powi(2))
        .sum::<f32>()
        / interior;
    // Squash into [0, 1) so no single scalar dominates the histogram
    let texture = lap_variance / (1.0 + lap_variance);

    let mut descriptor = histogram.to_vec();
    descriptor.extend([edge_density, texture, brightness, contrast]);
    Ok(descriptor)
}
