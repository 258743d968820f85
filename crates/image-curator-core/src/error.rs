use std::path::PathBuf;
use thiserror::Error;

use crate::processing::HashAlgorithm;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the image-curator library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be decoded (corrupt or unsupported bytes)
    #[error("Failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// A single perceptual hash algorithm failed
    #[error("{algorithm} hash failed: {reason}")]
    Hash {
        algorithm: HashAlgorithm,
        reason: String,
    },

    /// Persisted index and manifest disagree
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Insert attempted on a clustered index before training
    #[error("Index must be trained before vectors can be inserted")]
    IndexNotTrained,

    /// Vector length does not match the index dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Hardlink requested across filesystems
    #[error("{} and {} are on different filesystems", .master.display(), .duplicate.display())]
    CrossDevice { master: PathBuf, duplicate: PathBuf },

    /// Hash cache failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Encoding or decoding of persisted state failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Safety check failure
    #[error("Safety check failed: {0}")]
    SafetyCheck(String),

    #[error("Operation interrupted")]
    Interrupted,
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Decode {
            path: PathBuf::new(),
            reason: err.to_string(),
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Attach a path to a decode error produced without one
    pub(crate) fn with_path(self, path: &std::path::Path) -> Self {
        match self {
            Error::Decode { reason, .. } => Error::Decode {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        }
    }
}
