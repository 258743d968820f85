//! Weighted multi-algorithm similarity between two images.
//!
//! Each algorithm both images carry contributes `1 - hamming / bits`, scaled by
//! its weight. The sum is divided by the weights actually applied, so an
//! algorithm that failed on one side lowers confidence without dragging the
//! score toward zero. Byte-identical files score exactly 1.0.

use crate::config::HashWeights;
use crate::processing::PerceptualHashes;
use crate::types::ImageRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer {
    weights: HashWeights,
}

impl SimilarityScorer {
    pub fn new(weights: HashWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &HashWeights {
        &self.weights
    }

    /// Similarity of two records in [0, 1]
    pub fn similarity(&self, a: &ImageRecord, b: &ImageRecord) -> f64 {
        if a.content_hash == b.content_hash {
            return 1.0;
        }
        self.perceptual_similarity(&a.perceptual, &b.perceptual)
    }

    /// Similarity from perceptual codes alone.
    ///
    /// 0.0 when either side is empty or no algorithm is shared.
    pub fn perceptual_similarity(&self, a: &PerceptualHashes, b: &PerceptualHashes) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let mut weighted = 0.0;
        let mut applied = 0.0;

        // BTreeMap order on both sides keeps the sum symmetric bit-for-bit
        for (algorithm, code_a) in a.iter() {
            let Some(code_b) = b.get(algorithm) else {
                continue;
            };
            let Some(distance) = code_a.distance(code_b) else {
                continue;
            };
            if code_a.is_empty() {
                continue;
            }

            let weight = self.weights.weight(algorithm);
            let similarity = 1.0 - distance as f64 / code_a.len() as f64;
            weighted += weight * similarity;
            applied += weight;
        }

        if applied <= 0.0 {
            return 0.0;
        }
        (weighted / applied).clamp(0.0, 1.0)
    }
}
