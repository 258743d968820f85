use hnsw_rs::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{check_dimension, rank, read_bincode, write_bincode, IndexStrategy, VectorStore};
use crate::error::{Error, Result};

pub(crate) const META_FILE: &str = "graph.meta";
const BASENAME: &str = "graph";
const MAX_ELEMENTS: usize = 1_000_000;
const MAX_LAYERS: usize = 16;

/// Everything hnsw_rs does not record in its own dump
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphMeta {
    dimension: usize,
    count: usize,
    basename: String,
    max_connections: usize,
    ef_construction: usize,
    ef_search: usize,
}

/// Approximate search over an HNSW graph
pub struct GraphStore {
    hnsw: Hnsw<'static, f32, DistL2>,
    dimension: usize,
    count: usize,
    max_connections: usize,
    ef_construction: usize,
    ef_search: usize,
}

impl GraphStore {
    pub fn new(dimension: usize, max_connections: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self {
            hnsw: Hnsw::<f32, _>::new(max_connections, MAX_ELEMENTS, MAX_LAYERS, ef_construction, DistL2 {}),
            dimension,
            count: 0,
            max_connections,
            ef_construction,
            ef_search,
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let meta: GraphMeta = read_bincode(&dir.join(META_FILE))?;
        let mut store = Self::new(meta.dimension, meta.max_connections, meta.ef_construction, meta.ef_search);
        if meta.count == 0 {
            return Ok(store);
        }

        let graph_file = dir.join(format!("{}.hnsw.graph", meta.basename));
        if !graph_file.exists() {
            return Err(Error::IndexCorrupt(format!(
                "graph dump {} is missing",
                graph_file.display()
            )));
        }

        // The loaded graph borrows from its reloader for its whole lifetime
        let reloader = HnswIo::new(dir, &meta.basename);
        let reloader = Box::leak(Box::new(reloader));
        store.hnsw = reloader
            .load_hnsw_with_dist(DistL2 {})
            .map_err(|e| Error::IndexCorrupt(format!("cannot load graph: {}", e)))?;
        store.count = store.hnsw.get_nb_point();

        if store.count != meta.count {
            return Err(Error::IndexCorrupt(format!(
                "graph holds {} points but its metadata declares {}",
                store.count, meta.count
            )));
        }
        Ok(store)
    }

    fn remove_stale_dumps(dir: &Path) -> Result<()> {
        for suffix in ["hnsw.graph", "hnsw.data"] {
            let path = dir.join(format!("{}.{}", BASENAME, suffix));
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl VectorStore for GraphStore {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Graph {
            max_connections: self.max_connections,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.count
    }

    fn insert(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        check_dimension(self.dimension, vector)?;
        self.hnsw.insert((vector, id));
        self.count += 1;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        if self.count == 0 {
            return Ok(Vec::new());
        }
        let neighbours = self.hnsw.search(query, k, self.ef_search.max(k));
        let hits = neighbours.into_iter().map(|n| (n.d_id, n.distance)).collect();
        Ok(rank(hits, k))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        Self::remove_stale_dumps(dir)?;

        let basename = if self.count > 0 {
            self.hnsw
                .file_dump(dir, BASENAME)
                .map_err(|e| Error::IndexCorrupt(format!("cannot write graph: {}", e)))?
        } else {
            BASENAME.to_string()
        };
        debug!("Dumped graph of {} points as {}", self.count, basename);

        let meta = GraphMeta {
            dimension: self.dimension,
            count: self.count,
            basename,
            max_connections: self.max_connections,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        };
        write_bincode(&dir.join(META_FILE), &meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BruteForceStore;
    use rand::prelude::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    const DIM: usize = 12;

    fn random_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| (0..DIM).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect()
    }

    fn filled(vectors: &[Vec<f32>]) -> GraphStore {
        let mut store = GraphStore::new(DIM, 16, 200, 64);
        for (id, v) in vectors.iter().enumerate() {
            store.insert(id, v).unwrap();
        }
        store
    }

    #[test]
    fn test_recall_against_brute_force() {
        let vectors = random_vectors(500, 1);
        let graph = filled(&vectors);
        let mut exact = BruteForceStore::new(DIM);
        for (id, v) in vectors.iter().enumerate() {
            exact.insert(id, v).unwrap();
        }

        let mut found = 0;
        let mut expected = 0;
        for query in random_vectors(20, 2) {
            let truth: HashSet<usize> = exact.search(&query, 10).unwrap().into_iter().map(|h| h.0).collect();
            let approx = graph.search(&query, 10).unwrap();
            found += approx.iter().filter(|h| truth.contains(&h.0)).count();
            expected += truth.len();
        }
        let recall = found as f64 / expected as f64;
        assert!(recall >= 0.8, "recall {}", recall);
    }

    #[test]
    fn test_distances_are_euclidean() {
        let mut store = GraphStore::new(2, 8, 50, 16);
        store.insert(0, &[0.0, 0.0]).unwrap();
        store.insert(1, &[3.0, 4.0]).unwrap();
        let hits = store.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, 0);
        assert!((hits[1].1 - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let vectors = random_vectors(100, 3);
        let store = filled(&vectors);
        store.save(dir.path()).unwrap();
        // A second save over the same directory replaces the dump
        store.save(dir.path()).unwrap();

        let loaded = GraphStore::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 100);
        assert_eq!(loaded.strategy(), store.strategy());
        assert_eq!(loaded.search(&vectors[42], 1).unwrap()[0].0, 42);
    }

    #[test]
    fn test_empty_save_and_load() {
        let dir = tempdir().unwrap();
        GraphStore::new(DIM, 16, 200, 64).save(dir.path()).unwrap();
        let loaded = GraphStore::load(dir.path()).unwrap();
        assert!(loaded.is_empty());
        assert!(loaded.search(&[0.0; DIM], 3).unwrap().is_empty());
    }

    #[test]
    fn test_missing_dump_is_corrupt() {
        let dir = tempdir().unwrap();
        filled(&random_vectors(10, 4)).save(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("graph.hnsw.graph")).unwrap();
        assert!(matches!(GraphStore::load(dir.path()), Err(Error::IndexCorrupt(_))));
    }
}
