//! Parallel hashing of a whole input set.
//!
//! Inputs are processed in fixed-size chunks on a dedicated rayon pool. Each
//! chunk's new hashes go to the cache in a single RocksDB write batch, so an
//! interrupted run leaves only complete entries behind. Results come back in
//! input order regardless of scheduling.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use super::hasher::HashComputer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_hash_error};
use crate::persistence::HashCache;
use crate::types::{ContentHash, FailedItem, ImageInput, ImageRecord};

/// Configuration for batch processing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of threads to use
    pub thread_limit: usize,
    /// Maximum number of images per batch
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            thread_limit: num_cpus::get(),
            batch_size: 50,
            show_progress: false,
        }
    }
}

impl BatchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thread_limit: config.effective_threads(),
            show_progress: config.show_progress,
            ..Self::default()
        }
    }

    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_limit.max(1))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build thread pool: {}", e)))
    }
}

/// Records for every image that hashed, and the reason for every one that did not
#[derive(Debug, Default)]
pub struct HashingOutcome {
    pub records: Vec<ImageRecord>,
    pub failures: Vec<FailedItem>,

    /// Records whose perceptual hashes came from the cache
    pub cache_hits: usize,
}

enum ItemOutcome {
    Hashed { record: ImageRecord, cached: bool },
    Failed(FailedItem),
    Cancelled,
}

pub(crate) fn progress_bar(len: usize, show: bool, message: &'static str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{eta}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(message);
    bar
}

/// Resolve the content hash for an input, using the supplied one when present
pub(crate) fn resolve_content_hash(input: &ImageInput, hasher: &HashComputer) -> Result<ContentHash> {
    match input.content_hash {
        Some(hash) => Ok(hash),
        None => hasher.content_hash(&input.path),
    }
}

fn hash_one(input: &ImageInput, hasher: &HashComputer, cache: Option<&HashCache>) -> ItemOutcome {
    let path = &input.path;

    let size = match std::fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            log_file_error(path, "metadata", &e);
            return ItemOutcome::Failed(FailedItem::new(path, Error::Io(e)));
        }
    };

    let content_hash = match resolve_content_hash(input, hasher) {
        Ok(hash) => hash,
        Err(e) => {
            log_hash_error(path, &e);
            return ItemOutcome::Failed(FailedItem::new(path, e));
        }
    };

    let cached = cache.and_then(|cache| match cache.get_hashes(path, &content_hash) {
        Ok(hit) => hit.filter(|hashes| hashes.covers(hasher.algorithms())),
        Err(e) => {
            warn!("Hash cache read failed for {}: {}", path.display(), e);
            None
        }
    });

    let (perceptual, from_cache) = match cached {
        Some(hashes) => (hashes, true),
        None => match hasher.perceptual_hashes(path) {
            Ok(hashes) => (hashes, false),
            Err(e) => {
                log_hash_error(path, &e);
                return ItemOutcome::Failed(FailedItem::new(path, e));
            }
        },
    };

    ItemOutcome::Hashed {
        record: ImageRecord {
            path: path.clone(),
            size,
            content_hash,
            perceptual,
            feature_vector: None,
        },
        cached: from_cache,
    }
}

/// Hash every input in parallel.
///
/// Per-image failures are collected, never propagated. Returns
/// `Error::Interrupted` if `cancel` fires before the run completes.
pub fn hash_images(
    inputs: &[ImageInput],
    hasher: &HashComputer,
    cache: Option<&HashCache>,
    config: &BatchConfig,
    cancel: &CancelToken,
) -> Result<HashingOutcome> {
    let start = Instant::now();
    info!(
        "Hashing {} images with {} threads",
        inputs.len(),
        config.thread_limit
    );

    let pool = config.build_pool()?;
    let progress = progress_bar(inputs.len(), config.show_progress, "Computing image hashes...");
    let processed = AtomicUsize::new(0);
    let mut outcome = HashingOutcome::default();

    for chunk in inputs.chunks(config.batch_size.max(1)) {
        cancel.check()?;

        let results: Vec<ItemOutcome> = pool.install(|| {
            chunk
                .par_iter()
                .map(|input| {
                    if cancel.is_cancelled() {
                        return ItemOutcome::Cancelled;
                    }
                    let result = hash_one(input, hasher, cache);
                    processed.fetch_add(1, Ordering::Relaxed);
                    progress.inc(1);
                    result
                })
                .collect()
        });

        let mut fresh = Vec::new();
        let mut interrupted = false;
        for result in results {
            match result {
                ItemOutcome::Hashed { record, cached } => {
                    if cached {
                        outcome.cache_hits += 1;
                    } else {
                        fresh.push(outcome.records.len());
                    }
                    outcome.records.push(record);
                }
                ItemOutcome::Failed(item) => outcome.failures.push(item),
                ItemOutcome::Cancelled => interrupted = true,
            }
        }

        if let Some(cache) = cache {
            let entries = fresh.iter().map(|&i| {
                let record = &outcome.records[i];
                (
                    record.path.as_path(),
                    &record.content_hash,
                    &record.perceptual,
                )
            });
            match cache.put_hashes_batch(entries) {
                Ok(written) => debug!("Cached hashes for {} images", written),
                Err(e) => warn!("Failed to write hash cache batch: {}", e),
            }
        }

        if interrupted {
            progress.abandon_with_message("Interrupted");
            return Err(Error::Interrupted);
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        processed.load(Ordering::Relaxed) as f64 / elapsed
    } else {
        0.0
    };
    progress.finish_with_message(format!("Completed at {:.1} images/sec", rate));

    info!(
        "Hashed {} images ({} from cache, {} failed) in {:.2}s",
        outcome.records.len(),
        outcome.cache_hits,
        outcome.failures.len(),
        elapsed
    );
    Ok(outcome)
}
