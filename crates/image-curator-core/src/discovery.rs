use log::{debug, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::types::ImageInput;

/// Walk `directories` for image files.
///
/// The result is sorted by path and free of duplicates, so overlapping roots
/// are harmless. A missing root is an error; unreadable entries below a root
/// are logged and skipped.
pub fn discover_images<P: AsRef<Path>>(
    directories: &[P],
    config: &DiscoveryConfig,
) -> Result<Vec<ImageInput>> {
    let roots: Vec<PathBuf> = directories
        .iter()
        .map(|dir| dir.as_ref().to_path_buf())
        .collect();

    let mut paths = roots
        .par_iter()
        .map(|dir| discover_in_directory(dir, config))
        .collect::<Vec<Result<Vec<PathBuf>>>>()
        .into_iter()
        .try_fold(Vec::new(), |mut acc, result| {
            acc.extend(result?);
            Ok::<_, Error>(acc)
        })?;

    paths.sort();
    paths.dedup();
    debug!("Discovered {} images in {} roots", paths.len(), roots.len());

    Ok(paths.into_iter().map(ImageInput::new).collect())
}

fn discover_in_directory(directory: &Path, config: &DiscoveryConfig) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        return Err(Error::FileNotFound(directory.to_path_buf()));
    }

    let mut walker = WalkDir::new(directory).follow_links(config.follow_links);
    if let Some(depth) = config.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_image_path(entry.path(), config) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Whether the extension is one of the configured image extensions
pub fn is_image_path(path: &Path, config: &DiscoveryConfig) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| config.extensions.iter().any(|e| *e == ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"DUMMY IMAGE DATA").unwrap();
        path
    }

    fn setup_test_directory() -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let files = vec![
            touch(dir.path(), "image1.jpg"),
            touch(dir.path(), "image2.PNG"),
            touch(dir.path(), "image3.webp"),
            touch(&subdir, "nested1.jpeg"),
            touch(&subdir, "nested2.gif"),
        ];
        touch(dir.path(), "document.txt");
        touch(dir.path(), "image1.jpg.json");

        (dir, files)
    }

    #[test]
    fn test_is_image_path() {
        let config = DiscoveryConfig::default();
        assert!(is_image_path(Path::new("test.jpg"), &config));
        assert!(is_image_path(Path::new("test.JPEG"), &config));
        assert!(is_image_path(Path::new("test.png"), &config));
        assert!(!is_image_path(Path::new("test.txt"), &config));
        assert!(!is_image_path(Path::new("test"), &config));
    }

    #[test]
    fn test_discovers_sorted_images() {
        let (dir, mut files) = setup_test_directory();
        let discovered = discover_images(&[dir.path()], &DiscoveryConfig::default()).unwrap();

        files.sort();
        let paths: Vec<PathBuf> = discovered.into_iter().map(|i| i.path).collect();
        assert_eq!(paths, files);
    }

    #[test]
    fn test_depth_limit() {
        let (dir, _) = setup_test_directory();
        let config = DiscoveryConfig {
            max_depth: Some(1),
            ..DiscoveryConfig::default()
        };

        let discovered = discover_images(&[dir.path()], &config).unwrap();
        assert_eq!(discovered.len(), 3);
        assert!(discovered
            .iter()
            .all(|i| i.path.parent() == Some(dir.path())));
    }

    #[test]
    fn test_overlapping_roots_deduplicated() {
        let (dir, files) = setup_test_directory();
        let roots = vec![dir.path().to_path_buf(), dir.path().join("subdir")];
        let discovered = discover_images(&roots, &DiscoveryConfig::default()).unwrap();
        assert_eq!(discovered.len(), files.len());
    }

    #[test]
    fn test_missing_directory() {
        let result = discover_images(
            &[Path::new("/path/that/does/not/exist")],
            &DiscoveryConfig::default(),
        );
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
