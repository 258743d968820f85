use image::DynamicImage;
use log::{debug, warn};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::cryptographic;
use super::decode::{decode_image, prepare_for_hashing};
use super::perceptual;
use super::types::{HashAlgorithm, PerceptualHashes};
use crate::config::HashingConfig;
use crate::error::{Error, Result};
use crate::logging::log_hash_error;
use crate::types::ContentHash;

/// Computes content and perceptual hashes, memoizing both for one run.
///
/// Memo keys are absolute paths. Cross-run reuse belongs to the hash cache.
pub struct HashComputer {
    algorithms: Vec<HashAlgorithm>,
    max_dimension: u32,
    content_memo: Mutex<HashMap<PathBuf, ContentHash>>,
    perceptual_memo: Mutex<HashMap<PathBuf, PerceptualHashes>>,
}

/// Extract a readable message from a caught panic payload
pub(crate) fn extract_panic_info(panic_err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_err.downcast_ref::<&str>() {
        format!("Panic with message: {}", s)
    } else if let Some(s) = panic_err.downcast_ref::<String>() {
        format!("Panic with message: {}", s)
    } else {
        "Unknown panic occurred".to_string()
    }
}

fn memo_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl HashComputer {
    pub fn new(config: &HashingConfig) -> Self {
        let mut algorithms = config.algorithms.clone();
        algorithms.sort();
        algorithms.dedup();

        Self {
            algorithms,
            max_dimension: config.max_dimension,
            content_memo: Mutex::new(HashMap::new()),
            perceptual_memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn algorithms(&self) -> &[HashAlgorithm] {
        &self.algorithms
    }

    /// Blake3 digest of the file's bytes
    pub fn content_hash<P: AsRef<Path>>(&self, path: P) -> Result<ContentHash> {
        let key = memo_key(path.as_ref());
        if let Some(hash) = self.content_memo.lock().ok().and_then(|m| m.get(&key).copied()) {
            return Ok(hash);
        }

        let hash = cryptographic::content_hash(path.as_ref())?;
        if let Ok(mut memo) = self.content_memo.lock() {
            memo.insert(key, hash);
        }
        Ok(hash)
    }

    /// Decode the image and run every configured algorithm on it.
    ///
    /// A decode failure is an error. A failing algorithm is recorded in the
    /// result's failures; only when every algorithm fails is that an error.
    pub fn perceptual_hashes<P: AsRef<Path>>(&self, path: P) -> Result<PerceptualHashes> {
        let path = path.as_ref();
        let key = memo_key(path);
        if let Some(hashes) = self
            .perceptual_memo
            .lock()
            .ok()
            .and_then(|m| m.get(&key).cloned())
        {
            return Ok(hashes);
        }

        let img = decode_image(path).into_result()?;
        let hashes = self
            .hashes_from_image(&img)
            .inspect_err(|e| log_hash_error(path, e))?;

        for (algorithm, reason) in hashes.failures() {
            warn!(
                "{} hash failed for {}: {}",
                algorithm,
                path.display(),
                reason
            );
        }

        if let Ok(mut memo) = self.perceptual_memo.lock() {
            memo.insert(key, hashes.clone());
        }
        Ok(hashes)
    }

    /// Run the configured algorithms on an already decoded image
    pub fn hashes_from_image(&self, img: &DynamicImage) -> Result<PerceptualHashes> {
        let prepared = prepare_for_hashing(img.clone(), self.max_dimension);
        let mut hashes = PerceptualHashes::new();

        for &algorithm in &self.algorithms {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                perceptual::compute(algorithm, &prepared)
            }));

            match outcome {
                Ok(Ok(code)) => hashes.insert(algorithm, code),
                Ok(Err(e)) => hashes.record_failure(algorithm, e.to_string()),
                Err(panic_err) => {
                    hashes.record_failure(algorithm, extract_panic_info(panic_err))
                }
            }
        }

        if hashes.is_empty() {
            let (algorithm, reason) = hashes
                .failures()
                .next()
                .map(|(a, r)| (a, r.to_string()))
                .unwrap_or((HashAlgorithm::Average, "no algorithms configured".to_string()));
            return Err(Error::Hash { algorithm, reason });
        }

        debug!(
            "Computed {} perceptual codes ({} failed)",
            hashes.len(),
            hashes.failures().count()
        );
        Ok(hashes)
    }

    /// Drop the per-run memo
    pub fn clear(&self) {
        if let Ok(mut memo) = self.content_memo.lock() {
            memo.clear();
        }
        if let Ok(mut memo) = self.perceptual_memo.lock() {
            memo.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, seed: u8) {
        let img = RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8 ^ seed, (y * 5) as u8, seed.wrapping_mul(3)])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_all_algorithms_computed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 7);

        let computer = HashComputer::new(&HashingConfig::default());
        let hashes = computer.perceptual_hashes(&path).unwrap();

        assert_eq!(hashes.len(), HashAlgorithm::ALL.len());
        assert!(!hashes.is_partial());
    }

    #[test]
    fn test_memoized_within_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 1);

        let computer = HashComputer::new(&HashingConfig::default());
        let first = computer.content_hash(&path).unwrap();

        // The memo answers even after the bytes change
        write_png(&path, 99);
        assert_eq!(computer.content_hash(&path).unwrap(), first);

        computer.clear();
        assert_ne!(computer.content_hash(&path).unwrap(), first);
    }

    #[test]
    fn test_decode_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, b"not a png").unwrap();

        let computer = HashComputer::new(&HashingConfig::default());
        assert!(matches!(
            computer.perceptual_hashes(&path),
            Err(Error::Decode { .. })
        ));
        // Content hashing still works on undecodable bytes
        assert!(computer.content_hash(&path).is_ok());
    }

    #[test]
    fn test_empty_image_fails_every_algorithm() {
        let computer = HashComputer::new(&HashingConfig::default());
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            computer.hashes_from_image(&empty),
            Err(Error::Hash { .. })
        ));
    }

    #[test]
    fn test_subset_of_algorithms() {
        let config = HashingConfig {
            algorithms: vec![HashAlgorithm::Gradient, HashAlgorithm::Average],
            ..HashingConfig::default()
        };
        let computer = HashComputer::new(&config);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([1, 2, 3])));
        let hashes = computer.hashes_from_image(&img).unwrap();

        let algorithms: Vec<_> = hashes.iter().map(|(a, _)| a).collect();
        assert_eq!(
            algorithms,
            vec![HashAlgorithm::Average, HashAlgorithm::Gradient]
        );
    }

    #[test]
    fn test_extract_panic_info() {
        let caught = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(extract_panic_info(caught), "Panic with message: boom");
    }
}
