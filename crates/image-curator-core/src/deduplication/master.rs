use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::GroupingConfig;
use crate::error::{Error, Result};
use crate::types::ImageRecord;

const ORGANIZED_BONUS: f64 = 100.0;
const SIDECAR_BONUS: f64 = 50.0;
const DESCRIPTIVE_NAME_BONUS: f64 = 10.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Picks the member of a group worth keeping.
///
/// Score: +100 under the organized root, +50 with a sidecar metadata file,
/// +size in MB, +10 for a descriptive filename. Highest score wins and ties
/// go to the earliest candidate.
#[derive(Debug, Clone)]
pub struct MasterSelector {
    organized_root: Option<PathBuf>,
    sidecar_extensions: Vec<String>,
    low_information: Vec<Regex>,
}

impl MasterSelector {
    pub fn new(config: &GroupingConfig) -> Result<Self> {
        let low_information = config
            .low_information_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::Configuration(format!("Invalid filename pattern {}: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            organized_root: config.organized_root.clone(),
            sidecar_extensions: config.sidecar_extensions.clone(),
            low_information,
        })
    }

    pub fn score(&self, record: &ImageRecord) -> f64 {
        let path = record.path.as_path();
        let mut score = record.size as f64 / BYTES_PER_MB;

        if self.is_organized(path) {
            score += ORGANIZED_BONUS;
        }
        if self.has_sidecar(path) {
            score += SIDECAR_BONUS;
        }
        if !self.is_low_information(path) {
            score += DESCRIPTIVE_NAME_BONUS;
        }
        score
    }

    /// Index of the best candidate, or None for an empty slice
    pub fn select(&self, candidates: &[&ImageRecord]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            let score = self.score(candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }

    fn is_organized(&self, path: &Path) -> bool {
        self.organized_root
            .as_ref()
            .is_some_and(|root| path.starts_with(root))
    }

    /// A sidecar is `photo.json` next to `photo.png`, or `photo.png.json`
    pub fn has_sidecar(&self, path: &Path) -> bool {
        self.sidecar_extensions.iter().any(|ext| {
            if path.with_extension(ext).is_file() {
                return true;
            }
            let mut appended = path.as_os_str().to_owned();
            appended.push(".");
            appended.push(ext);
            Path::new(&appended).is_file()
        })
    }

    pub fn is_low_information(&self, path: &Path) -> bool {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
            return true;
        };
        self.low_information.iter().any(|re| re.is_match(&stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::PerceptualHashes;
    use crate::types::ContentHash;
    use tempfile::tempdir;

    fn record(path: impl Into<PathBuf>, size: u64) -> ImageRecord {
        ImageRecord {
            path: path.into(),
            size,
            content_hash: ContentHash([0; 32]),
            perceptual: PerceptualHashes::new(),
            feature_vector: None,
        }
    }

    fn selector(root: Option<&Path>) -> MasterSelector {
        let config = GroupingConfig {
            organized_root: root.map(Path::to_path_buf),
            ..GroupingConfig::default()
        };
        MasterSelector::new(&config).unwrap()
    }

    #[test]
    fn test_low_information_names() {
        let selector = selector(None);
        assert!(selector.is_low_information(Path::new("/x/IMG_1234.jpg")));
        assert!(selector.is_low_information(Path::new("/x/DSC01234.JPG")));
        assert!(selector.is_low_information(Path::new("/x/ComfyUI_00042_.png")));
        assert!(selector.is_low_information(Path::new("/x/3f9a0c1b2d4e.png")));
        assert!(!selector.is_low_information(Path::new("/x/sunset over lake.png")));
    }

    #[test]
    fn test_organized_root_wins() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("library");
        let selector = selector(Some(&root));

        let loose = record(dir.path().join("downloads/sunset.png"), 5 * 1024 * 1024);
        let kept = record(root.join("IMG_0001.png"), 1024);

        assert_eq!(selector.select(&[&loose, &kept]), Some(1));
    }

    #[test]
    fn test_sidecar_bonus() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("portrait.png");
        let b = dir.path().join("portrait_copy.png");
        std::fs::write(dir.path().join("portrait_copy.png.json"), "{}").unwrap();

        let selector = selector(None);
        assert!(!selector.has_sidecar(&a));
        assert!(selector.has_sidecar(&b));
        assert_eq!(selector.select(&[&record(&a, 10), &record(&b, 10)]), Some(1));

        std::fs::write(dir.path().join("portrait.xmp"), "").unwrap();
        assert!(selector.has_sidecar(&a));
    }

    #[test]
    fn test_size_and_ties() {
        let selector = selector(None);
        let small = record("/x/apple.png", 1024 * 1024);
        let large = record("/x/banana.png", 3 * 1024 * 1024);
        assert_eq!(selector.select(&[&small, &large]), Some(1));

        let twin = record("/x/cherry.png", 1024 * 1024);
        assert_eq!(selector.select(&[&small, &twin]), Some(0));
        assert_eq!(selector.select(&[&twin, &small]), Some(0));
        assert_eq!(selector.select(&[]), None);
    }

    #[test]
    fn test_descriptive_name_preferred() {
        let selector = selector(None);
        let camera = record("/x/IMG_9999.png", 2048);
        let named = record("/x/mountain_dawn.png", 2048);
        assert_eq!(selector.select(&[&camera, &named]), Some(1));
    }
}
