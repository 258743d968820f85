mod db;
mod models;

pub use db::HashCache;
pub use models::{CacheStats, CachedHashes, CachedVector};

#[cfg(test)]
mod tests;
