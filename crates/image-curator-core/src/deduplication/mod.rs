//! Partitioning a set of hashed images into duplicate groups.
//!
//! Phase 1 buckets records by content hash; every bucket with two or more
//! files is an exact group. Phase 2 runs greedy seed clustering over the
//! remaining records plus each exact group's master: every ungrouped record
//! in path order seeds a group, and every later ungrouped record scoring at
//! least the threshold against the seed joins it. Membership is decided
//! against the seed only, so the groups are not transitively closed.

mod master;

pub use master::MasterSelector;

use log::{debug, info};
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Result;
use crate::similarity::SimilarityScorer;
use crate::types::{ContentHash, DuplicateGroup, GroupType, ImageRecord};

pub struct DuplicateGrouper {
    scorer: SimilarityScorer,
    selector: MasterSelector,
    threshold: f64,
}

impl DuplicateGrouper {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            scorer: SimilarityScorer::new(config.hashing.weights),
            selector: MasterSelector::new(&config.grouping)?,
            threshold: config.grouping.similarity_threshold,
        })
    }

    /// Exact groups followed by similar groups.
    ///
    /// Deterministic for a given record set regardless of input order.
    pub fn group(&self, records: &[ImageRecord]) -> Vec<DuplicateGroup> {
        let mut ordered: Vec<&ImageRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));
        ordered.dedup_by(|a, b| a.path == b.path);

        let (mut groups, survivors) = self.exact_groups(&ordered);
        let exact_count = groups.len();
        groups.extend(self.similar_groups(&survivors));

        info!(
            "Grouped {} images into {} exact and {} similar groups",
            ordered.len(),
            exact_count,
            groups.len() - exact_count
        );
        groups
    }

    /// Phase 1. `ordered` must be sorted by path.
    ///
    /// Returns the exact groups and the records that go on to phase 2: every
    /// record outside an exact group, plus each exact group's master.
    fn exact_groups<'a>(
        &self,
        ordered: &[&'a ImageRecord],
    ) -> (Vec<DuplicateGroup>, Vec<&'a ImageRecord>) {
        let mut buckets: BTreeMap<ContentHash, Vec<&'a ImageRecord>> = BTreeMap::new();
        for record in ordered {
            buckets.entry(record.content_hash).or_default().push(record);
        }

        let mut groups = Vec::new();
        let mut survivors = Vec::new();
        for members in buckets.into_values() {
            if members.len() < 2 {
                survivors.extend(members);
                continue;
            }

            let master_index = self.selector.select(&members).unwrap_or(0);
            let master = members[master_index];
            let duplicates = members
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != master_index)
                .map(|(_, record)| (*record, 1.0))
                .collect();

            debug!(
                "Exact group of {} with master {}",
                members.len(),
                master.path.display()
            );
            groups.push(DuplicateGroup::new(master, duplicates, GroupType::Exact));
            survivors.push(master);
        }

        groups.sort_by(|a, b| a.master.cmp(&b.master));
        survivors.sort_by(|a, b| a.path.cmp(&b.path));
        (groups, survivors)
    }

    /// Phase 2 over `candidates`, which must be sorted by path.
    ///
    /// Scores for one seed are computed in parallel; only this loop writes
    /// `grouped`.
    fn similar_groups(&self, candidates: &[&ImageRecord]) -> Vec<DuplicateGroup> {
        let mut grouped = vec![false; candidates.len()];
        let mut groups = Vec::new();

        for i in 0..candidates.len() {
            if grouped[i] {
                continue;
            }
            let seed = candidates[i];

            let matches: Vec<usize> = (i + 1..candidates.len())
                .into_par_iter()
                .filter(|&j| !grouped[j])
                .filter(|&j| self.scorer.similarity(seed, candidates[j]) >= self.threshold)
                .collect();
            if matches.is_empty() {
                continue;
            }

            grouped[i] = true;
            let mut members = vec![seed];
            for j in matches {
                grouped[j] = true;
                members.push(candidates[j]);
            }

            let master_index = self.selector.select(&members).unwrap_or(0);
            let master = members[master_index];
            let duplicates = members
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != master_index)
                .map(|(_, record)| (*record, self.scorer.similarity(master, record)))
                .collect();

            debug!(
                "Similar group of {} seeded by {}",
                members.len(),
                seed.path.display()
            );
            groups.push(DuplicateGroup::new(master, duplicates, GroupType::Similar));
        }

        groups
    }
}
