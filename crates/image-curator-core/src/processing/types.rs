/// Hash code types shared by the hashing, scoring and feature modules
///
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The perceptual hash algorithms a run can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// Mean-thresholded 8x8 grayscale (aHash)
    Average,

    /// Low-frequency DCT coefficients against their median (pHash)
    Frequency,

    /// Horizontal neighbour differences on a 9x8 grid (dHash)
    Gradient,

    /// Haar wavelet approximation band against its median (wHash)
    Wavelet,

    /// Quantized hue/saturation histogram
    Color,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Average,
        HashAlgorithm::Frequency,
        HashAlgorithm::Gradient,
        HashAlgorithm::Wavelet,
        HashAlgorithm::Color,
    ];

    /// Number of bits in the code this algorithm produces
    pub fn code_bits(&self) -> usize {
        match self {
            HashAlgorithm::Color => 42,
            _ => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Average => "average",
            HashAlgorithm::Frequency => "frequency",
            HashAlgorithm::Gradient => "gradient",
            HashAlgorithm::Wavelet => "wavelet",
            HashAlgorithm::Color => "color",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed-length perceptual bit code, packed little-endian into u64 words
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashCode {
    words: Vec<u64>,
    len: usize,
}

impl HashCode {
    /// Pack a sequence of bits; bit `i` of the code is the `i`th item
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0;
        for bit in bits {
            if len % 64 == 0 {
                words.push(0u64);
            }
            if bit {
                words[len / 64] |= 1u64 << (len % 64);
            }
            len += 1;
        }
        Self { words, len }
    }

    /// Number of bits in the code
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit(&self, i: usize) -> bool {
        i < self.len && (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Calculate the Hamming distance between two codes.
    ///
    /// Returns `None` when the codes have different lengths and cannot be compared.
    pub fn distance(&self, other: &HashCode) -> Option<u32> {
        if self.len != other.len {
            return None;
        }
        Some(
            self.words
                .iter()
                .zip(&other.words)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }

    /// Check if two codes are within `threshold` differing bits
    pub fn is_similar(&self, other: &HashCode, threshold: u32) -> bool {
        matches!(self.distance(other), Some(d) if d <= threshold)
    }

    /// Each bit as 0.0 or 1.0, in code order
    pub fn to_floats(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(|i| if self.bit(i) { 1.0 } else { 0.0 })
    }
}

impl fmt::Debug for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashCode({} bits:", self.len)?;
        for word in &self.words {
            write!(f, " {:016x}", word)?;
        }
        write!(f, ")")
    }
}

/// Perceptual codes for one image, plus the algorithms that failed on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptualHashes {
    codes: BTreeMap<HashAlgorithm, HashCode>,

    #[serde(default)]
    failures: BTreeMap<HashAlgorithm, String>,
}

impl PerceptualHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, algorithm: HashAlgorithm, code: HashCode) {
        self.failures.remove(&algorithm);
        self.codes.insert(algorithm, code);
    }

    pub fn record_failure(&mut self, algorithm: HashAlgorithm, reason: impl Into<String>) {
        self.codes.remove(&algorithm);
        self.failures.insert(algorithm, reason.into());
    }

    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&HashCode> {
        self.codes.get(&algorithm)
    }

    /// Codes in algorithm order
    pub fn iter(&self) -> impl Iterator<Item = (HashAlgorithm, &HashCode)> {
        self.codes.iter().map(|(a, c)| (*a, c))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// True when at least one configured algorithm failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = (HashAlgorithm, &str)> {
        self.failures.iter().map(|(a, r)| (*a, r.as_str()))
    }

    /// True when every algorithm in `algorithms` has either a code or a recorded failure
    pub fn covers(&self, algorithms: &[HashAlgorithm]) -> bool {
        algorithms
            .iter()
            .all(|a| self.codes.contains_key(a) || self.failures.contains_key(a))
    }
}
