use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::IndexStrategy;
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Everything needed to interpret a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub dimension: usize,

    /// Strategy identifier and its parameters
    pub strategy: IndexStrategy,

    /// Must equal the number of vectors in the store
    pub vector_count: usize,

    /// Path for each store id, in insertion order
    pub paths: Vec<PathBuf>,
}

impl IndexManifest {
    pub fn new(strategy: IndexStrategy, dimension: usize, paths: Vec<PathBuf>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: chrono::Utc::now(),
            dimension,
            strategy,
            vector_count: paths.len(),
            paths,
        }
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        let file = std::fs::File::create(dir.join(MANIFEST_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Read and version-check the manifest in `dir`
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let file = std::fs::File::open(&path).map_err(|e| {
            Error::IndexCorrupt(format!("cannot open {}: {}", path.display(), e))
        })?;
        let manifest: IndexManifest = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::IndexCorrupt(format!("unreadable manifest: {}", e)))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(Error::IndexCorrupt(format!(
                "manifest version {} is not supported (expected {})",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let manifest = IndexManifest::new(
            IndexStrategy::graph(),
            326,
            vec![PathBuf::from("/a.png"), PathBuf::from("/b.png")],
        );
        manifest.write(dir.path()).unwrap();

        let loaded = IndexManifest::read(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.vector_count, 2);
    }

    #[test]
    fn test_strategy_is_tagged() {
        let json = serde_json::to_value(IndexStrategy::clustered()).unwrap();
        assert_eq!(json["kind"], "clustered");
        assert_eq!(json["nlist"], 64);
    }

    #[test]
    fn test_missing_manifest_is_corrupt() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            IndexManifest::read(dir.path()),
            Err(Error::IndexCorrupt(_))
        ));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let dir = tempdir().unwrap();
        let mut manifest = IndexManifest::new(IndexStrategy::BruteForce, 4, vec![]);
        manifest.version = 99;
        manifest.write(dir.path()).unwrap();

        assert!(matches!(
            IndexManifest::read(dir.path()),
            Err(Error::IndexCorrupt(_))
        ));
    }
}
