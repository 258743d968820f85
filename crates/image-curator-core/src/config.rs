use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::index::IndexStrategy;
use crate::processing::HashAlgorithm;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Weight of each perceptual algorithm in the combined similarity score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashWeights {
    pub average: f64,
    pub frequency: f64,
    pub gradient: f64,
    pub wavelet: f64,
    pub color: f64,
}

impl Default for HashWeights {
    fn default() -> Self {
        Self {
            average: 0.2,
            frequency: 0.3,
            gradient: 0.2,
            wavelet: 0.2,
            color: 0.1,
        }
    }
}

impl HashWeights {
    pub fn weight(&self, algorithm: HashAlgorithm) -> f64 {
        match algorithm {
            HashAlgorithm::Average => self.average,
            HashAlgorithm::Frequency => self.frequency,
            HashAlgorithm::Gradient => self.gradient,
            HashAlgorithm::Wavelet => self.wavelet,
            HashAlgorithm::Color => self.color,
        }
    }

    pub fn total(&self) -> f64 {
        HashAlgorithm::ALL.iter().map(|a| self.weight(*a)).sum()
    }
}

/// Hash computation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Algorithms computed for every image
    pub algorithms: Vec<HashAlgorithm>,

    pub weights: HashWeights,

    /// Images larger than this on either side are downscaled before hashing
    pub max_dimension: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithms: HashAlgorithm::ALL.to_vec(),
            weights: HashWeights::default(),
            max_dimension: 1024,
        }
    }
}

/// Duplicate grouping and master selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Minimum combined similarity for two images to be near-duplicates
    pub similarity_threshold: f64,

    /// Files under this root are preferred as masters
    pub organized_root: Option<PathBuf>,

    /// Extensions of metadata files that may sit next to an image
    pub sidecar_extensions: Vec<String>,

    /// Regexes for filename stems that carry no information
    pub low_information_patterns: Vec<String>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.9,
            organized_root: None,
            sidecar_extensions: ["json", "txt", "xmp", "yaml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            low_information_patterns: vec![
                r"(?i)^(img|dsc|dscn|dcim|pxl|image|photo|comfyui)[_-]?\d+_?$".to_string(),
                r"(?i)^[0-9a-f_-]{8,}$".to_string(),
            ],
        }
    }
}

/// Which files directory walks pick up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Lower-case extensions treated as images
    pub extensions: Vec<String>,

    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,

    pub follow_links: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_depth: None,
            follow_links: false,
        }
    }
}

/// Configuration for the curation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    pub hashing: HashingConfig,

    pub grouping: GroupingConfig,

    /// Strategy and parameters for the similarity index
    pub index: IndexStrategy,

    /// Location of the persistent hash cache (None disables it)
    pub cache_path: Option<PathBuf>,

    /// Number of threads to use for processing (0 = auto)
    pub threads: usize,

    /// Whether to draw progress bars
    pub show_progress: bool,

    /// Directory for rolling log files
    pub log_dir: Option<PathBuf>,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            hashing: HashingConfig::default(),
            grouping: GroupingConfig::default(),
            index: IndexStrategy::BruteForce,
            cache_path: dirs::cache_dir().map(|dir| dir.join("image-curator").join("hash-cache")),
            threads: 0, // Auto
            show_progress: true,
            log_dir: None,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Worker threads to use, resolving 0 to the CPU count
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.discovery.extensions.is_empty() {
            return Err(Error::Configuration(
                "At least one image extension must be listed".to_string(),
            ));
        }

        if self.hashing.algorithms.is_empty() {
            return Err(Error::Configuration(
                "At least one hash algorithm must be enabled".to_string(),
            ));
        }

        let weights = &self.hashing.weights;
        if HashAlgorithm::ALL.iter().any(|a| weights.weight(*a) < 0.0) {
            return Err(Error::Configuration(
                "Hash weights must not be negative".to_string(),
            ));
        }
        if (weights.total() - 1.0).abs() > 1e-6 {
            return Err(Error::Configuration(format!(
                "Hash weights must sum to 1.0, got {}",
                weights.total()
            )));
        }

        let threshold = self.grouping.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Configuration(
                "Similarity threshold must be between 0 and 1".to_string(),
            ));
        }

        for pattern in &self.grouping.low_information_patterns {
            Regex::new(pattern).map_err(|e| {
                Error::Configuration(format!("Invalid filename pattern {}: {}", pattern, e))
            })?;
        }

        self.index.validate()
    }
}
