use serde::{Deserialize, Serialize};

use crate::processing::PerceptualHashes;
use crate::types::ContentHash;

/// Perceptual hashes stored under `h:<path>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedHashes {
    /// Content hash of the bytes the codes were computed from
    pub content_hash: ContentHash,

    pub perceptual: PerceptualHashes,

    /// Unix timestamp of the write
    pub cached_at: i64,
}

/// Feature vector stored under `v:<path>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedVector {
    pub content_hash: ContentHash,
    pub vector: Vec<f32>,
    pub cached_at: i64,
}

/// Entry counts per key family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hash_entries: usize,
    pub vector_entries: usize,
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
