use std::path::Path;

use tempfile::tempdir;

use super::HashCache;
use crate::processing::{HashAlgorithm, HashCode, PerceptualHashes};
use crate::types::ContentHash;

fn sample_hashes() -> PerceptualHashes {
    let mut hashes = PerceptualHashes::new();
    hashes.insert(
        HashAlgorithm::Average,
        HashCode::from_bits((0..64).map(|i| i % 2 == 0)),
    );
    hashes.record_failure(HashAlgorithm::Color, "simulated");
    hashes
}

#[test]
fn test_hashes_round_trip() {
    let dir = tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("cache")).unwrap();
    let path = Path::new("/photos/a.png");
    let content = ContentHash([7; 32]);

    cache.put_hashes(path, &content, &sample_hashes()).unwrap();
    let loaded = cache.get_hashes(path, &content).unwrap().unwrap();

    assert_eq!(loaded, sample_hashes());
    assert!(loaded.is_partial());
}

#[test]
fn test_changed_content_is_miss() {
    let dir = tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("cache")).unwrap();
    let path = Path::new("/photos/a.png");

    cache
        .put_hashes(path, &ContentHash([1; 32]), &sample_hashes())
        .unwrap();
    assert!(cache
        .get_hashes(path, &ContentHash([2; 32]))
        .unwrap()
        .is_none());

    // Overwriting replaces the stale entry only
    cache
        .put_hashes(path, &ContentHash([2; 32]), &sample_hashes())
        .unwrap();
    assert!(cache
        .get_hashes(path, &ContentHash([2; 32]))
        .unwrap()
        .is_some());
    assert_eq!(cache.stats().unwrap().hash_entries, 1);
}

#[test]
fn test_vectors_and_invalidate() {
    let dir = tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("cache")).unwrap();
    let path = Path::new("/photos/b.png");
    let content = ContentHash([3; 32]);

    cache.put_vector(path, &content, &[0.6, 0.8]).unwrap();
    cache.put_hashes(path, &content, &sample_hashes()).unwrap();
    assert_eq!(
        cache.get_vector(path, &content).unwrap(),
        Some(vec![0.6, 0.8])
    );

    let stats = cache.stats().unwrap();
    assert_eq!((stats.hash_entries, stats.vector_entries), (1, 1));

    cache.invalidate(path).unwrap();
    assert!(cache.get_vector(path, &content).unwrap().is_none());
    assert!(cache.get_hashes(path, &content).unwrap().is_none());
}

#[test]
fn test_batch_write() {
    let dir = tempdir().unwrap();
    let cache = HashCache::open(dir.path().join("cache")).unwrap();
    let hashes = sample_hashes();
    let content = ContentHash([9; 32]);
    let paths = [Path::new("/a.png"), Path::new("/b.png"), Path::new("/c.png")];

    let written = cache
        .put_hashes_batch(paths.iter().map(|p| (*p, &content, &hashes)))
        .unwrap();

    assert_eq!(written, 3);
    assert_eq!(cache.stats().unwrap().hash_entries, 3);
}

#[test]
fn test_survives_reopen() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache");
    let path = Path::new("/photos/c.png");
    let content = ContentHash([4; 32]);

    {
        let cache = HashCache::open(&cache_path).unwrap();
        cache.put_hashes(path, &content, &sample_hashes()).unwrap();
        cache.flush().unwrap();
    }

    let cache = HashCache::open(&cache_path).unwrap();
    assert!(cache.get_hashes(path, &content).unwrap().is_some());
}
