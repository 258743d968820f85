use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::processing::PerceptualHashes;

/// Blake3 digest of a file's raw bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a slice, as stored in the hash cache
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", blake3::Hash::from(self.0).to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

/// A candidate file handed to the core by the enumeration layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub path: PathBuf,

    /// Precomputed content hash, if an upstream layer already has one
    pub content_hash: Option<ContentHash>,
}

impl ImageInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content_hash: None,
        }
    }

    pub fn with_content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// Everything one pass knows about an image. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Full path to the image file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Cryptographic hash for exact matching
    pub content_hash: ContentHash,

    /// Perceptual codes for similarity detection
    pub perceptual: PerceptualHashes,

    /// Present only when feature extraction succeeded
    pub feature_vector: Option<Vec<f32>>,
}

/// How a group's members relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    /// Byte-identical files
    Exact,

    /// Visually similar, byte-different files
    Similar,
}

/// Group of duplicate images with the representative to keep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The image to keep
    pub master: PathBuf,

    /// The other members, in grouping order
    pub duplicates: Vec<PathBuf>,

    /// Similarity of each duplicate to the master (1.0 for exact groups)
    pub similarity_scores: BTreeMap<PathBuf, f64>,

    pub group_type: GroupType,

    /// Size of every member, master included
    pub total_size: u64,

    /// Bytes reclaimed by removing every duplicate
    pub potential_savings: u64,
}

impl DuplicateGroup {
    /// Build a group from its master and scored duplicates.
    ///
    /// The master is dropped from `duplicates` if present, scores are clamped
    /// to [0, 1] and forced to 1.0 for exact groups.
    pub fn new(
        master: &ImageRecord,
        duplicates: Vec<(&ImageRecord, f64)>,
        group_type: GroupType,
    ) -> Self {
        let mut paths = Vec::with_capacity(duplicates.len());
        let mut scores = BTreeMap::new();
        let mut savings = 0;

        for (record, score) in duplicates {
            if record.path == master.path {
                continue;
            }
            let score = match group_type {
                GroupType::Exact => 1.0,
                GroupType::Similar => score.clamp(0.0, 1.0),
            };
            savings += record.size;
            scores.insert(record.path.clone(), score);
            paths.push(record.path.clone());
        }

        Self {
            master: master.path.clone(),
            duplicates: paths,
            similarity_scores: scores,
            group_type,
            total_size: master.size + savings,
            potential_savings: savings,
        }
    }

    /// Number of files in the group, master included
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.duplicates.is_empty()
    }

    /// Master first, then duplicates
    pub fn members(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.master.as_path()).chain(self.duplicates.iter().map(|p| p.as_path()))
    }
}

/// A file the pass could not use, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub path: PathBuf,
    pub error: String,
}

impl FailedItem {
    pub fn new(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

/// Output of a grouping pass, consumed by organizing and CLI layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// Images that were hashed successfully and took part in grouping
    pub total_images: usize,

    pub groups: Vec<DuplicateGroup>,
    pub exact_group_count: usize,
    pub similar_group_count: usize,
    pub total_potential_savings: u64,

    /// Files that could not be read or decoded
    pub error_count: usize,
    pub failures: Vec<FailedItem>,
}

impl DuplicateReport {
    pub fn new(total_images: usize, groups: Vec<DuplicateGroup>, failures: Vec<FailedItem>) -> Self {
        let exact_group_count = groups
            .iter()
            .filter(|g| g.group_type == GroupType::Exact)
            .count();
        let total_potential_savings = groups.iter().map(|g| g.potential_savings).sum();

        Self {
            generated_at: chrono::Utc::now(),
            total_images,
            exact_group_count,
            similar_group_count: groups.len() - exact_group_count,
            total_potential_savings,
            error_count: failures.len(),
            failures,
            groups,
        }
    }
}

/// One hit from a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarResult {
    pub path: PathBuf,

    /// `1 / (1 + distance)`
    pub similarity: f32,

    /// Raw L2 distance between feature vectors
    pub distance: f32,
}

/// Counts from building a similarity index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexBuildStats {
    /// Vectors inserted into the index
    pub indexed: usize,

    /// Vectors served from the hash cache
    pub cached: usize,

    /// Vectors computed during this build
    pub extracted: usize,

    /// Images left out because extraction failed
    pub skipped: usize,

    pub failures: Vec<FailedItem>,
}

/// Result of a duplicate removal pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalStats {
    /// Duplicates removed from exact groups
    pub removed_exact: usize,

    /// Duplicates removed from similar groups
    pub removed_similar: usize,

    /// Duplicates replaced with hardlinks to their master
    pub linked: usize,

    /// Duplicates left alone (already linked to their master, or gone)
    pub skipped: usize,

    pub bytes_freed: u64,

    /// Per-file failures; the pass never aborts on one
    pub errors: usize,
}

impl RemovalStats {
    pub fn total_removed(&self) -> usize {
        self.removed_exact + self.removed_similar
    }
}
