use log::{debug, info};
use rocksdb::{IteratorMode, Options as rdbOptions, WriteBatch, DB};
use std::path::Path;

use super::models::{now_timestamp, CacheStats, CachedHashes, CachedVector};
use crate::error::Result;
use crate::processing::PerceptualHashes;
use crate::types::ContentHash;

const HASH_PREFIX: &[u8] = b"h:";
const VECTOR_PREFIX: &[u8] = b"v:";

fn key(prefix: &[u8], path: &Path) -> Vec<u8> {
    let path_str = path.to_string_lossy();
    [prefix, path_str.as_bytes()].concat()
}

/// Cross-run cache of perceptual hashes and feature vectors, keyed by path.
///
/// Every entry carries the content hash it was computed from. A lookup with a
/// different content hash is a miss, and the next write replaces the entry.
/// RocksDB handles concurrent readers and writers, so the cache is shared by
/// reference across worker threads.
pub struct HashCache {
    db: DB,
}

impl HashCache {
    /// Open (or create) the cache at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = rdbOptions::default();
        options.create_if_missing(true);
        options.increase_parallelism(num_cpus::get() as i32);
        options.set_max_background_jobs(4);
        options.set_write_buffer_size(64 * 1024 * 1024); // 64MB write buffer

        let db = DB::open(&options, path)?;
        info!("Hash cache opened at {}", path.display());
        Ok(Self { db })
    }

    /// Cached hashes for `path`, if they were computed from `content_hash`
    pub fn get_hashes(
        &self,
        path: &Path,
        content_hash: &ContentHash,
    ) -> Result<Option<PerceptualHashes>> {
        let Some(bytes) = self.db.get(key(HASH_PREFIX, path))? else {
            return Ok(None);
        };
        let entry: CachedHashes = bincode::deserialize(&bytes)?;

        if entry.content_hash != *content_hash {
            debug!("Stale cached hashes for {}", path.display());
            return Ok(None);
        }
        Ok(Some(entry.perceptual))
    }

    pub fn put_hashes(
        &self,
        path: &Path,
        content_hash: &ContentHash,
        perceptual: &PerceptualHashes,
    ) -> Result<()> {
        let entry = CachedHashes {
            content_hash: *content_hash,
            perceptual: perceptual.clone(),
            cached_at: now_timestamp(),
        };
        self.db
            .put(key(HASH_PREFIX, path), bincode::serialize(&entry)?)?;
        Ok(())
    }

    /// Write many hash entries in one RocksDB batch
    pub fn put_hashes_batch<'a, I>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a Path, &'a ContentHash, &'a PerceptualHashes)>,
    {
        let mut batch = WriteBatch::default();
        let cached_at = now_timestamp();
        let mut count = 0;

        for (path, content_hash, perceptual) in entries {
            let entry = CachedHashes {
                content_hash: *content_hash,
                perceptual: perceptual.clone(),
                cached_at,
            };
            batch.put(key(HASH_PREFIX, path), bincode::serialize(&entry)?);
            count += 1;
        }

        if count > 0 {
            self.db.write(batch)?;
        }
        Ok(count)
    }

    /// Cached feature vector for `path`, if it was computed from `content_hash`
    pub fn get_vector(&self, path: &Path, content_hash: &ContentHash) -> Result<Option<Vec<f32>>> {
        let Some(bytes) = self.db.get(key(VECTOR_PREFIX, path))? else {
            return Ok(None);
        };
        let entry: CachedVector = bincode::deserialize(&bytes)?;

        if entry.content_hash != *content_hash {
            debug!("Stale cached vector for {}", path.display());
            return Ok(None);
        }
        Ok(Some(entry.vector))
    }

    pub fn put_vector(&self, path: &Path, content_hash: &ContentHash, vector: &[f32]) -> Result<()> {
        let entry = CachedVector {
            content_hash: *content_hash,
            vector: vector.to_vec(),
            cached_at: now_timestamp(),
        };
        self.db
            .put(key(VECTOR_PREFIX, path), bincode::serialize(&entry)?)?;
        Ok(())
    }

    /// Drop every entry for `path`
    pub fn invalidate(&self, path: &Path) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.delete(key(HASH_PREFIX, path));
        batch.delete(key(VECTOR_PREFIX, path));
        self.db.write(batch)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            if key.starts_with(HASH_PREFIX) {
                stats.hash_entries += 1;
            } else if key.starts_with(VECTOR_PREFIX) {
                stats.vector_entries += 1;
            }
        }
        Ok(stats)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
