// Hash primitives
pub mod cryptographic;
pub mod decode;
pub mod perceptual;
pub mod types;

// Per-image engines and the batch driver
pub mod batch;
pub mod features;
pub mod hasher;

pub use batch::{hash_images, BatchConfig, HashingOutcome};
pub use decode::{decode_image, DecodeOutcome};
pub use features::FeatureExtractor;
pub use hasher::HashComputer;
pub use types::{HashAlgorithm, HashCode, PerceptualHashes};
