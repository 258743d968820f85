use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{check_dimension, l2_distance, rank, read_bincode, write_bincode, IndexStrategy, VectorStore};
use crate::error::{Error, Result};

pub(crate) const DATA_FILE: &str = "vectors.bin";

/// Exact search over a flat vector table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceStore {
    dimension: usize,
    ids: Vec<usize>,
    /// `ids.len() * dimension` values, row-major
    data: Vec<f32>,
}

impl BruteForceStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let store: BruteForceStore = read_bincode(&dir.join(DATA_FILE))?;
        if store.data.len() != store.ids.len() * store.dimension {
            return Err(Error::IndexCorrupt(format!(
                "{} holds {} values for {} vectors of dimension {}",
                DATA_FILE,
                store.data.len(),
                store.ids.len(),
                store.dimension
            )));
        }
        Ok(store)
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dimension..(i + 1) * self.dimension]
    }
}

impl VectorStore for BruteForceStore {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn insert(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        check_dimension(self.dimension, vector)?;
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        let hits: Vec<(usize, f32)> = (0..self.ids.len())
            .into_par_iter()
            .map(|i| (self.ids[i], l2_distance(query, self.row(i))))
            .collect();
        Ok(rank(hits, k))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        write_bincode(&dir.join(DATA_FILE), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> BruteForceStore {
        let mut store = BruteForceStore::new(2);
        store.insert(0, &[0.0, 0.0]).unwrap();
        store.insert(1, &[3.0, 4.0]).unwrap();
        store.insert(2, &[1.0, 0.0]).unwrap();
        store
    }

    #[test]
    fn test_nearest_first() {
        let hits = store().search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec![(0, 0.0), (2, 1.0), (1, 5.0)]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut store = BruteForceStore::new(1);
        store.insert(5, &[1.0]).unwrap();
        store.insert(3, &[-1.0]).unwrap();
        let hits = store.search(&[0.0], 2).unwrap();
        assert_eq!(hits[0].0, 3);
        assert_eq!(hits[1].0, 5);
    }

    #[test]
    fn test_k_larger_than_store() {
        assert_eq!(store().search(&[1.0, 1.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let original = store();
        original.save(dir.path()).unwrap();

        let loaded = BruteForceStore::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.search(&[3.0, 3.0], 3).unwrap(),
            original.search(&[3.0, 3.0], 3).unwrap()
        );
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let mut store = BruteForceStore::new(3);
        assert!(matches!(
            store.insert(0, &[1.0]),
            Err(Error::DimensionMismatch { expected: 3, actual: 1 })
        ));
    }
}
