//! Nearest-neighbour index over image feature vectors.
//!
//! Three interchangeable stores sit behind [`VectorStore`]:
//!
//! - [`BruteForceStore`]: exact linear scan, no training
//! - [`ClusteredStore`]: inverted file over k-means lists, trained before inserts
//! - [`GraphStore`]: HNSW graph, no training
//!
//! [`SimilarityIndex`] maps store ids back to paths and owns persistence
//! through an [`IndexManifest`] written next to the store's own files.

mod brute_force;
mod clustered;
mod graph;
mod manifest;

pub use brute_force::BruteForceStore;
pub use clustered::ClusteredStore;
pub use graph::GraphStore;
pub use manifest::{IndexManifest, MANIFEST_FILE, MANIFEST_VERSION};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::types::SimilarResult;

/// Which store backs the index, with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexStrategy {
    BruteForce,
    Clustered {
        /// Number of inverted lists (k-means centroids)
        nlist: usize,
        /// Lists scanned per query
        nprobe: usize,
        /// Maximum vectors used for training
        train_sample: usize,
        /// Lloyd iterations
        iterations: usize,
        seed: u64,
    },
    Graph {
        max_connections: usize,
        ef_construction: usize,
        ef_search: usize,
    },
}

impl IndexStrategy {
    pub fn clustered() -> Self {
        IndexStrategy::Clustered {
            nlist: 64,
            nprobe: 8,
            train_sample: 4096,
            iterations: 25,
            seed: 42,
        }
    }

    pub fn graph() -> Self {
        IndexStrategy::Graph {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexStrategy::BruteForce => "brute_force",
            IndexStrategy::Clustered { .. } => "clustered",
            IndexStrategy::Graph { .. } => "graph",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            IndexStrategy::BruteForce => Ok(()),
            IndexStrategy::Clustered {
                nlist,
                nprobe,
                train_sample,
                ..
            } => {
                if *nlist == 0 || *nprobe == 0 {
                    return Err(Error::Configuration(
                        "Clustered index needs nlist > 0 and nprobe > 0".to_string(),
                    ));
                }
                if *train_sample == 0 {
                    return Err(Error::Configuration(
                        "Clustered index needs a non-empty training sample".to_string(),
                    ));
                }
                Ok(())
            }
            IndexStrategy::Graph {
                max_connections,
                ef_construction,
                ef_search,
            } => {
                if *max_connections == 0 || *ef_construction == 0 || *ef_search == 0 {
                    return Err(Error::Configuration(
                        "Graph index parameters must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Storage and search contract shared by every strategy.
///
/// Ids are dense insertion positions assigned by [`SimilarityIndex`].
/// Distances are Euclidean.
pub trait VectorStore: Send + Sync {
    fn strategy(&self) -> IndexStrategy;

    fn dimension(&self) -> usize;

    /// Number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether inserts are allowed yet
    fn is_trained(&self) -> bool {
        true
    }

    /// One-time training pass; a no-op for stores that need none
    fn train(&mut self, _vectors: &[&[f32]]) -> Result<()> {
        Ok(())
    }

    fn insert(&mut self, id: usize, vector: &[f32]) -> Result<()>;

    /// Up to `k` `(id, distance)` pairs, nearest first
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Write the store's files into `dir`
    fn save(&self, dir: &Path) -> Result<()>;
}

/// Euclidean distance
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Sort `(id, distance)` nearest first, ties by id, and keep `k`
pub(crate) fn rank(mut hits: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits.truncate(k);
    hits
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    bincode::serialize_into(&mut writer, value)?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

/// Read a store file; any failure means the persisted index cannot be trusted
pub(crate) fn read_bincode<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::IndexCorrupt(format!("cannot open {}: {}", path.display(), e)))?;
    bincode::deserialize_from(std::io::BufReader::new(file))
        .map_err(|e| Error::IndexCorrupt(format!("cannot decode {}: {}", path.display(), e)))
}

/// A fresh, empty store for `strategy`
pub fn new_store(strategy: &IndexStrategy, dimension: usize) -> Box<dyn VectorStore> {
    match strategy {
        IndexStrategy::BruteForce => Box::new(BruteForceStore::new(dimension)),
        IndexStrategy::Clustered {
            nlist,
            nprobe,
            train_sample,
            iterations,
            seed,
        } => Box::new(ClusteredStore::new(
            dimension,
            *nlist,
            *nprobe,
            *train_sample,
            *iterations,
            *seed,
        )),
        IndexStrategy::Graph {
            max_connections,
            ef_construction,
            ef_search,
        } => Box::new(GraphStore::new(
            dimension,
            *max_connections,
            *ef_construction,
            *ef_search,
        )),
    }
}

fn load_store(strategy: &IndexStrategy, dir: &Path) -> Result<Box<dyn VectorStore>> {
    Ok(match strategy {
        IndexStrategy::BruteForce => Box::new(BruteForceStore::load(dir)?),
        IndexStrategy::Clustered { .. } => Box::new(ClusteredStore::load(dir)?),
        IndexStrategy::Graph { .. } => Box::new(GraphStore::load(dir)?),
    })
}

/// Feature-vector index keyed by image path
pub struct SimilarityIndex {
    store: Box<dyn VectorStore>,
    paths: Vec<PathBuf>,
}

impl std::fmt::Debug for SimilarityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityIndex")
            .field("strategy", &self.store.strategy().name())
            .field("dimension", &self.store.dimension())
            .field("len", &self.paths.len())
            .finish()
    }
}

impl SimilarityIndex {
    /// An empty index
    pub fn new(strategy: &IndexStrategy, dimension: usize) -> Self {
        Self {
            store: new_store(strategy, dimension),
            paths: Vec::new(),
        }
    }

    /// Build from `(path, vector)` pairs.
    ///
    /// Paths are deduplicated and inserted in path order, so the same input
    /// always yields the same ids. Training, if the strategy needs it, sees
    /// every vector before the first insert. On cancellation the partial
    /// index is dropped and `Error::Interrupted` returned.
    pub fn build(
        entries: Vec<(PathBuf, Vec<f32>)>,
        strategy: &IndexStrategy,
        dimension: usize,
        cancel: &CancelToken,
    ) -> Result<Self> {
        strategy.validate()?;

        let entries: BTreeMap<PathBuf, Vec<f32>> = entries.into_iter().collect();
        for vector in entries.values() {
            check_dimension(dimension, vector)?;
        }

        let mut index = Self::new(strategy, dimension);
        if entries.is_empty() {
            info!("Built empty {} index", strategy.name());
            return Ok(index);
        }

        if !index.store.is_trained() {
            let vectors: Vec<&[f32]> = entries.values().map(|v| v.as_slice()).collect();
            index.store.train(&vectors)?;
        }

        for (path, vector) in entries {
            cancel.check()?;
            index.insert(path, &vector)?;
        }

        info!(
            "Built {} index with {} vectors of dimension {}",
            strategy.name(),
            index.len(),
            dimension
        );
        Ok(index)
    }

    /// Train the underlying store, for indexes filled with [`insert`](Self::insert)
    pub fn train(&mut self, vectors: &[&[f32]]) -> Result<()> {
        self.store.train(vectors)
    }

    pub fn insert(&mut self, path: PathBuf, vector: &[f32]) -> Result<()> {
        check_dimension(self.store.dimension(), vector)?;
        if !self.store.is_trained() {
            return Err(Error::IndexNotTrained);
        }
        let id = self.paths.len();
        self.store.insert(id, vector)?;
        self.paths.push(path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.store.strategy()
    }

    /// Paths in insertion order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p.as_path() == path)
    }

    /// Up to `k` nearest images to `query`.
    ///
    /// `query_path` names the image the query vector came from; it is left out
    /// of the results unless `include_self` is set. An empty index returns an
    /// empty list.
    pub fn search(
        &self,
        query: &[f32],
        query_path: Option<&Path>,
        k: usize,
        include_self: bool,
    ) -> Result<Vec<SimilarResult>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.store.dimension(), query)?;

        let excluded = query_path.filter(|_| !include_self);
        // Never more than the index holds; an unbounded k must not size buffers
        let fetch = if excluded.is_some() { k.saturating_add(1) } else { k };
        let fetch = fetch.min(self.len());

        let mut results = Vec::with_capacity(fetch);
        for (id, distance) in self.store.search(query, fetch)? {
            let path = self.paths.get(id).ok_or_else(|| {
                Error::IndexCorrupt(format!(
                    "store returned id {} but only {} paths are known",
                    id,
                    self.paths.len()
                ))
            })?;
            if excluded.is_some_and(|q| q == path.as_path()) {
                continue;
            }
            results.push(SimilarResult {
                path: path.clone(),
                similarity: 1.0 / (1.0 + distance),
                distance,
            });
        }
        results.truncate(k);

        debug!("Search returned {} results", results.len());
        Ok(results)
    }

    /// Write the store files and `manifest.json` into `dir`
    pub fn persist<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        self.store.save(dir)?;
        let manifest = IndexManifest::new(self.store.strategy(), self.dimension(), self.paths.clone());
        manifest.write(dir)?;

        info!(
            "Persisted {} index with {} vectors to {}",
            manifest.strategy.name(),
            manifest.vector_count,
            dir.display()
        );
        Ok(())
    }

    /// Load an index written by [`persist`](Self::persist).
    ///
    /// Fails with `Error::IndexCorrupt` when the manifest and the store
    /// disagree on vector count, dimension or strategy.
    pub fn restore<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = IndexManifest::read(dir)?;

        let store = load_store(&manifest.strategy, dir).map_err(|e| match e {
            Error::IndexCorrupt(_) => e,
            other => Error::IndexCorrupt(format!("failed to load index data: {}", other)),
        })?;

        if store.len() != manifest.vector_count || manifest.paths.len() != manifest.vector_count {
            return Err(Error::IndexCorrupt(format!(
                "manifest declares {} vectors ({} paths) but index holds {}",
                manifest.vector_count,
                manifest.paths.len(),
                store.len()
            )));
        }
        if store.dimension() != manifest.dimension {
            return Err(Error::IndexCorrupt(format!(
                "manifest declares dimension {} but index has {}",
                manifest.dimension,
                store.dimension()
            )));
        }
        if store.strategy() != manifest.strategy {
            return Err(Error::IndexCorrupt(format!(
                "manifest declares a {} index but data is {}",
                manifest.strategy.name(),
                store.strategy().name()
            )));
        }

        info!(
            "Restored {} index with {} vectors from {}",
            manifest.strategy.name(),
            manifest.vector_count,
            dir.display()
        );
        Ok(Self {
            store,
            paths: manifest.paths,
        })
    }
}
