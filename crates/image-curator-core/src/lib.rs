//! Perceptual deduplication and similarity search for large image collections.
//!
//! The crate is organised around a handful of components:
//! - [`processing`]: content and perceptual hashing, feature vectors, the
//!   parallel batch driver
//! - [`similarity`]: weighted multi-algorithm similarity scoring
//! - [`deduplication`]: exact and near-duplicate grouping with master selection
//! - [`index`]: nearest-neighbour search over feature vectors
//! - [`action`]: safe removal, backup and hardlinking of duplicates
//!
//! [`Curator`] wires them together into whole-collection passes.

// -- External Dependencies --
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use action::{RemovalEngine, RemovalOptions};
pub use cancel::CancelToken;
pub use config::*;
pub use deduplication::{DuplicateGrouper, MasterSelector};
pub use error::{Error, Result};
pub use index::{IndexStrategy, SimilarityIndex};
pub use persistence::HashCache;
pub use processing::{FeatureExtractor, HashAlgorithm, HashComputer, HashingOutcome};
pub use similarity::SimilarityScorer;
pub use types::*;

// -- Public Modules --
pub mod action;
pub mod cancel;
pub mod config;
pub mod deduplication;
pub mod discovery;
pub mod index;
pub mod logging;
pub mod persistence;
pub mod processing;
pub mod safety;
pub mod similarity;
pub mod types;

use processing::batch::{progress_bar, resolve_content_hash, BatchConfig};

/// Main entry point: one configured engine over one collection
pub struct Curator {
    config: Config,
    hasher: HashComputer,
    cache: Option<HashCache>,
    cancel: CancelToken,
}

enum VectorOutcome {
    Cached(PathBuf, Vec<f32>),
    Extracted(PathBuf, Vec<f32>),
    Skipped(FailedItem),
}

impl Curator {
    /// Validate `config` and open the hash cache it names
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let cache = match &config.cache_path {
            Some(path) => Some(HashCache::open(path)?),
            None => None,
        };

        Ok(Self {
            hasher: HashComputer::new(&config.hashing),
            config,
            cache,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> Option<&HashCache> {
        self.cache.as_ref()
    }

    /// A handle that cancels whatever pass is running on this engine
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Length of the feature vectors this engine produces
    pub fn feature_dimension(&self) -> usize {
        FeatureExtractor::new(&self.hasher).dimension()
    }

    pub fn discover_images<P: AsRef<Path>>(&self, directories: &[P]) -> Result<Vec<ImageInput>> {
        discovery::discover_images(directories, &self.config.discovery)
    }

    /// Content and perceptual hashes for every input, through the cache.
    /// Each call reads the files afresh.
    pub fn hash_images(&self, inputs: &[ImageInput]) -> Result<HashingOutcome> {
        self.hasher.clear();
        processing::hash_images(
            inputs,
            &self.hasher,
            self.cache.as_ref(),
            &BatchConfig::from_config(&self.config),
            &self.cancel,
        )
    }

    /// Hash `inputs` and group them into exact and similar duplicates.
    ///
    /// Files that cannot be read or decoded are left out of every group and
    /// listed in the report's failures.
    pub fn find_duplicates(&self, inputs: &[ImageInput]) -> Result<DuplicateReport> {
        let outcome = self.hash_images(inputs)?;
        self.cancel.check()?;

        let grouper = DuplicateGrouper::new(&self.config)?;
        let pool = BatchConfig::from_config(&self.config).build_pool()?;
        let groups = pool.install(|| grouper.group(&outcome.records));

        let report = DuplicateReport::new(outcome.records.len(), groups, outcome.failures);
        info!(
            "Found {} exact and {} similar groups, {} bytes reclaimable, {} errors",
            report.exact_group_count,
            report.similar_group_count,
            report.total_potential_savings,
            report.error_count
        );
        Ok(report)
    }

    /// Feature vector for one file, from the cache when its bytes are unchanged
    pub fn feature_vector(&self, path: &Path) -> Result<Vec<f32>> {
        self.hasher.clear();
        let content_hash = self.hasher.content_hash(path)?;
        self.vector_for(path, &content_hash).map(|(vector, _)| vector)
    }

    /// Returns the vector and whether it came from the cache
    fn vector_for(
        &self,
        path: &Path,
        content_hash: &ContentHash,
    ) -> Result<(Vec<f32>, bool)> {
        let extractor = FeatureExtractor::new(&self.hasher);
        let dimension = extractor.dimension();

        if let Some(cache) = &self.cache {
            match cache.get_vector(path, content_hash) {
                Ok(Some(vector)) if vector.len() == dimension => return Ok((vector, true)),
                Ok(Some(vector)) => info!(
                    "Cached vector for {} has dimension {}, expected {}; recomputing",
                    path.display(),
                    vector.len(),
                    dimension
                ),
                Ok(None) => {}
                Err(e) => warn!("Vector cache read failed for {}: {}", path.display(), e),
            }
        }

        let vector = extractor.extract(path)?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_vector(path, content_hash, &vector) {
                warn!("Failed to cache vector for {}: {}", path.display(), e);
            }
        }
        Ok((vector, false))
    }

    /// Build a similarity index over `inputs` with the configured strategy.
    ///
    /// Images whose vector cannot be produced are skipped and counted; they
    /// still take part in hash-based grouping. Cancellation discards the
    /// partial index.
    pub fn build_index(&self, inputs: &[ImageInput]) -> Result<(SimilarityIndex, IndexBuildStats)> {
        let start = Instant::now();
        self.hasher.clear();
        let batch = BatchConfig::from_config(&self.config);
        let pool = batch.build_pool()?;
        let progress = progress_bar(inputs.len(), batch.show_progress, "Extracting feature vectors...");

        let outcomes: Vec<VectorOutcome> = pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let outcome = match resolve_content_hash(input, &self.hasher)
                        .and_then(|hash| self.vector_for(&input.path, &hash))
                    {
                        Ok((vector, true)) => VectorOutcome::Cached(input.path.clone(), vector),
                        Ok((vector, false)) => VectorOutcome::Extracted(input.path.clone(), vector),
                        Err(e) => {
                            warn!("Skipping {} for indexing: {}", input.path.display(), e);
                            VectorOutcome::Skipped(FailedItem::new(&input.path, e))
                        }
                    };
                    progress.inc(1);
                    Some(outcome)
                })
                .collect::<Option<Vec<_>>>()
                .unwrap_or_default()
        });
        if self.cancel.is_cancelled() {
            progress.abandon_with_message("Interrupted");
            return Err(Error::Interrupted);
        }
        progress.finish_with_message("Feature extraction complete");

        let mut stats = IndexBuildStats::default();
        let mut entries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                VectorOutcome::Cached(path, vector) => {
                    stats.cached += 1;
                    entries.push((path, vector));
                }
                VectorOutcome::Extracted(path, vector) => {
                    stats.extracted += 1;
                    entries.push((path, vector));
                }
                VectorOutcome::Skipped(item) => {
                    stats.skipped += 1;
                    stats.failures.push(item);
                }
            }
        }

        let index = SimilarityIndex::build(
            entries,
            &self.config.index,
            self.feature_dimension(),
            &self.cancel,
        )?;
        stats.indexed = index.len();

        info!(
            "Indexed {} images ({} cached, {} extracted, {} skipped) in {:.2}s",
            stats.indexed,
            stats.cached,
            stats.extracted,
            stats.skipped,
            start.elapsed().as_secs_f64()
        );
        Ok((index, stats))
    }

    /// Up to `k` images in `index` most similar to the file at `path`
    pub fn find_similar(
        &self,
        index: &SimilarityIndex,
        path: &Path,
        k: usize,
        include_self: bool,
    ) -> Result<Vec<SimilarResult>> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let query = self.feature_vector(path)?;

        // Match the spelling used when the index was built
        let query_path = if index.contains(path) {
            path.to_path_buf()
        } else {
            std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
        };
        index.search(&query, Some(&query_path), k, include_self)
    }

    pub fn remove_duplicates(&self, groups: &[DuplicateGroup], options: &RemovalOptions) -> RemovalStats {
        RemovalEngine::new(self.cancel.clone()).remove_duplicates(groups, options)
    }

    pub fn create_hardlinks(&self, groups: &[DuplicateGroup], dry_run: bool) -> RemovalStats {
        RemovalEngine::new(self.cancel.clone()).create_hardlinks(groups, dry_run)
    }
}
