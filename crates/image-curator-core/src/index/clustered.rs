//! Inverted-file store: vectors are bucketed under their nearest k-means
//! centroid and a query scans only the `nprobe` closest buckets.

use log::{debug, info};
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{check_dimension, l2_distance, rank, read_bincode, write_bincode, IndexStrategy, VectorStore};
use crate::error::{Error, Result};

pub(crate) const DATA_FILE: &str = "clustered.bin";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InvertedList {
    ids: Vec<usize>,
    /// `ids.len() * dimension` values, row-major
    data: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteredStore {
    dimension: usize,
    nlist: usize,
    nprobe: usize,
    train_sample: usize,
    iterations: usize,
    seed: u64,
    /// Empty until trained; may hold fewer than `nlist` entries when the
    /// training set was small
    centroids: Vec<Vec<f32>>,
    lists: Vec<InvertedList>,
}

impl ClusteredStore {
    pub fn new(
        dimension: usize,
        nlist: usize,
        nprobe: usize,
        train_sample: usize,
        iterations: usize,
        seed: u64,
    ) -> Self {
        Self {
            dimension,
            nlist,
            nprobe,
            train_sample,
            iterations,
            seed,
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let store: ClusteredStore = read_bincode(&dir.join(DATA_FILE))?;

        if store.lists.len() != store.centroids.len() {
            return Err(Error::IndexCorrupt(format!(
                "{} centroids but {} inverted lists",
                store.centroids.len(),
                store.lists.len()
            )));
        }
        let centroids_ok = store.centroids.iter().all(|c| c.len() == store.dimension);
        let lists_ok = store
            .lists
            .iter()
            .all(|l| l.data.len() == l.ids.len() * store.dimension);
        if !centroids_ok || !lists_ok {
            return Err(Error::IndexCorrupt(format!(
                "clustered data does not match dimension {}",
                store.dimension
            )));
        }
        Ok(store)
    }

    /// Centroid count actually in use
    pub fn trained_lists(&self) -> usize {
        self.centroids.len()
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        nearest(&self.centroids, vector).0
    }
}

/// Index of the closest centroid and its distance
fn nearest(centroids: &[Vec<f32>], vector: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = l2_distance(vector, centroid);
        if distance < best.1 {
            best = (i, distance);
        }
    }
    best
}

/// Assign every point to its nearest centroid; returns assignments and the
/// summed distance
fn update_assignments(data: &[&[f32]], centroids: &[Vec<f32>]) -> (Vec<usize>, f32) {
    let (assignments, distances): (Vec<usize>, Vec<f32>) =
        data.par_iter().map(|point| nearest(centroids, point)).unzip();
    let distsum = distances.iter().sum();
    (assignments, distsum)
}

/// Mean of the points assigned to `cluster`, or None if it is empty
fn update_centroid(data: &[&[f32]], assignments: &[usize], cluster: usize, dimension: usize) -> Option<Vec<f32>> {
    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for (point, _) in data.iter().zip(assignments).filter(|(_, a)| **a == cluster) {
        for (s, v) in sum.iter_mut().zip(point.iter()) {
            *s += v;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    sum.iter_mut().for_each(|s| *s /= count as f32);
    Some(sum)
}

/// Lloyd's k-means from a seeded random initialisation.
///
/// Stops after `max_iter` rounds or as soon as the total distance stops
/// shrinking. Empty clusters keep their previous centroid.
fn kmeans(data: &[&[f32]], k: usize, max_iter: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    if data.is_empty() || k == 0 {
        return Vec::new();
    }
    let dimension = data[0].len();

    let mut centroids: Vec<Vec<f32>> = data
        .choose_multiple(rng, k)
        .map(|v| v.to_vec())
        .collect();
    let mut distsum = f32::INFINITY;

    for iteration in 0..max_iter {
        let (assignments, new_distsum) = update_assignments(data, &centroids);
        if new_distsum >= distsum {
            debug!("k-means converged after {} iterations", iteration);
            break;
        }
        distsum = new_distsum;

        let updated: Vec<Option<Vec<f32>>> = (0..k)
            .into_par_iter()
            .map(|cluster| update_centroid(data, &assignments, cluster, dimension))
            .collect();
        for (centroid, update) in centroids.iter_mut().zip(updated) {
            if let Some(update) = update {
                *centroid = update;
            }
        }
    }

    debug!("k-means total distance {:.4}", distsum);
    centroids
}

impl VectorStore for ClusteredStore {
    fn strategy(&self) -> IndexStrategy {
        IndexStrategy::Clustered {
            nlist: self.nlist,
            nprobe: self.nprobe,
            train_sample: self.train_sample,
            iterations: self.iterations,
            seed: self.seed,
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.lists.iter().map(|l| l.ids.len()).sum()
    }

    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Retraining discards every stored vector
    fn train(&mut self, vectors: &[&[f32]]) -> Result<()> {
        if vectors.is_empty() {
            return Err(Error::Configuration(
                "Cannot train a clustered index on zero vectors".to_string(),
            ));
        }
        for vector in vectors {
            check_dimension(self.dimension, vector)?;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample: Vec<&[f32]> = if vectors.len() > self.train_sample {
            vectors
                .choose_multiple(&mut rng, self.train_sample)
                .copied()
                .collect()
        } else {
            vectors.to_vec()
        };

        let k = self.nlist.min(sample.len());
        self.centroids = kmeans(&sample, k, self.iterations, &mut rng);
        self.lists = vec![InvertedList::default(); self.centroids.len()];

        info!(
            "Trained {} centroids on {} of {} vectors",
            self.centroids.len(),
            sample.len(),
            vectors.len()
        );
        Ok(())
    }

    fn insert(&mut self, id: usize, vector: &[f32]) -> Result<()> {
        check_dimension(self.dimension, vector)?;
        if !self.is_trained() {
            return Err(Error::IndexNotTrained);
        }
        let list = self.nearest_centroid(vector);
        self.lists[list].ids.push(id);
        self.lists[list].data.extend_from_slice(vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        check_dimension(self.dimension, query)?;
        if !self.is_trained() {
            return Ok(Vec::new());
        }

        let probes: Vec<usize> = rank(
            self.centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, l2_distance(query, c)))
                .collect(),
            self.nprobe,
        )
        .into_iter()
        .map(|(i, _)| i)
        .collect();

        let hits: Vec<(usize, f32)> = probes
            .par_iter()
            .flat_map_iter(|&list| {
                let list = &self.lists[list];
                list.ids
                    .iter()
                    .zip(list.data.chunks_exact(self.dimension))
                    .map(|(&id, row)| (id, l2_distance(query, row)))
            })
            .collect();
        Ok(rank(hits, k))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        write_bincode(&dir.join(DATA_FILE), self)
    }
}
