//! Image decoding with an explicit content-sniffing fallback.
//!
//! Files whose extension does not match their bytes (a PNG saved as `.jpg`, a
//! WebP renamed by a download tool) fail the extension-driven decode. Rather
//! than matching on error strings, the fallback is a separate, explicit step
//! that guesses the format from the file header.

use image::DynamicImage;
use log::{debug, warn};
use std::path::Path;

use crate::error::Error;

/// How an image was (or was not) decoded
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Decoded using the format implied by the extension
    Primary(DynamicImage),

    /// Extension decode failed; decoded by sniffing the header
    Fallback(DynamicImage),

    /// Neither path produced an image
    Failed(Error),
}

impl DecodeOutcome {
    pub fn into_result(self) -> Result<DynamicImage, Error> {
        match self {
            DecodeOutcome::Primary(img) | DecodeOutcome::Fallback(img) => Ok(img),
            DecodeOutcome::Failed(e) => Err(e),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DecodeOutcome::Fallback(_))
    }
}

/// Decode an image, trying the extension first and the file header second
pub fn decode_image<P: AsRef<Path>>(path: P) -> DecodeOutcome {
    let path = path.as_ref();

    let primary_error = match image::open(path) {
        Ok(img) => return DecodeOutcome::Primary(img),
        Err(e) => e,
    };
    debug!(
        "Extension decode failed for {}: {}, sniffing format",
        path.display(),
        primary_error
    );

    match sniff_and_decode(path) {
        Ok(img) => {
            warn!(
                "Decoded {} by content; its extension does not match its format",
                path.display()
            );
            DecodeOutcome::Fallback(img)
        }
        Err(fallback_error) => DecodeOutcome::Failed(Error::Decode {
            path: path.to_path_buf(),
            reason: format!("{} (sniffed: {})", primary_error, fallback_error),
        }),
    }
}

fn sniff_and_decode(path: &Path) -> Result<DynamicImage, image::ImageError> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    reader.decode()
}

/// Downscale so the larger side is at most `max_dimension`, keeping aspect ratio
pub fn prepare_for_hashing(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return img;
    }

    debug!(
        "Downscaling {}x{} image to at most {}px for hashing",
        width, height, max_dimension
    );
    img.resize(
        max_dimension,
        max_dimension,
        image::imageops::FilterType::Triangle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
        }))
    }

    #[test]
    fn test_primary_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.png");
        sample().save(&path).unwrap();

        assert!(matches!(decode_image(&path), DecodeOutcome::Primary(_)));
    }

    #[test]
    fn test_mislabelled_file_uses_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actually_png.jpg");
        sample()
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let outcome = decode_image(&path);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.into_result().unwrap().width(), 16);
    }

    #[test]
    fn test_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"definitely not an image").unwrap();

        assert!(matches!(
            decode_image(&path),
            DecodeOutcome::Failed(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_prepare_keeps_small_images() {
        let img = prepare_for_hashing(sample(), 1024);
        assert_eq!((img.width(), img.height()), (16, 16));
    }

    #[test]
    fn test_prepare_downscales_large_images() {
        let big = DynamicImage::ImageRgb8(RgbImage::new(400, 200));
        let img = prepare_for_hashing(big, 100);
        assert_eq!((img.width(), img.height()), (100, 50));
    }
}
