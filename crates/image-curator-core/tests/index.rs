mod common;

use common::*;
use image_curator_core::{Curator, Error, IndexStrategy, SimilarityIndex};
use tempfile::tempdir;

fn strategies() -> Vec<IndexStrategy> {
    vec![
        IndexStrategy::BruteForce,
        IndexStrategy::Clustered {
            nlist: 4,
            nprobe: 4,
            train_sample: 100,
            iterations: 10,
            seed: 3,
        },
        IndexStrategy::graph(),
    ]
}

#[test]
fn test_empty_collection() {
    let workspace = tempdir().unwrap();
    let probe = save(&gradient(), workspace.path(), "probe.png");

    for strategy in strategies() {
        let mut config = test_config(&workspace);
        config.index = strategy;
        let curator = Curator::new(config).unwrap();

        let (index, stats) = curator.build_index(&[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(stats.indexed, 0);
        assert!(curator.find_similar(&index, &probe, 5, false).unwrap().is_empty());
    }
}

#[test]
fn test_find_similar_excludes_query() {
    let workspace = tempdir().unwrap();
    let paths = scenario_a(workspace.path());
    let (x, y) = (&paths[0], &paths[1]);

    for strategy in strategies() {
        let mut config = test_config(&workspace);
        config.index = strategy.clone();
        let curator = Curator::new(config).unwrap();
        let (index, stats) = curator.build_index(&inputs(&paths)).unwrap();
        assert_eq!(stats.indexed, 5, "{}", strategy.name());
        assert_eq!(index.dimension(), curator.feature_dimension());

        let results = curator.find_similar(&index, x, 3, false).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| &r.path != x));
        // y has identical bytes, so an identical vector
        assert_eq!(&results[0].path, y);
        assert!(results[0].distance < 1e-6);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));

        let with_self = curator.find_similar(&index, x, 10, true).unwrap();
        assert_eq!(with_self.len(), 5);
        assert!(with_self.iter().any(|r| &r.path == x));
    }
}

#[test]
fn test_vectors_served_from_cache() {
    let workspace = tempdir().unwrap();
    let paths = scenario_a(workspace.path());
    let curator = curator(&workspace);

    let (first_index, first) = curator.build_index(&inputs(&paths)).unwrap();
    assert_eq!(first.extracted, 5);
    assert_eq!(first.cached, 0);

    let (second_index, second) = curator.build_index(&inputs(&paths)).unwrap();
    assert_eq!(second.cached, 5);
    assert_eq!(second.extracted, 0);

    let query = curator.feature_vector(&paths[3]).unwrap();
    assert_eq!(
        first_index.search(&query, None, 5, true).unwrap(),
        second_index.search(&query, None, 5, true).unwrap()
    );
}

#[test]
fn test_changed_file_invalidates_cached_vector() {
    let workspace = tempdir().unwrap();
    let path = save(&gradient(), workspace.path(), "mutable.png");

    let before = curator(&workspace).feature_vector(&path).unwrap();
    save(&checkerboard(8), workspace.path(), "mutable.png");

    // A new engine over the same cache; its in-memory memos start empty
    let after = curator(&workspace).feature_vector(&path).unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_same_engine_sees_edits_between_passes() {
    let workspace = tempdir().unwrap();
    let path = save(&gradient(), workspace.path(), "mutable.png");
    let other = save(&noise(3), workspace.path(), "other.png");
    let curator = curator(&workspace);

    let before = curator.feature_vector(&path).unwrap();
    let (_, first) = curator.build_index(&inputs(&[path.clone(), other.clone()])).unwrap();
    assert_eq!(first.cached, 1);

    save(&checkerboard(8), workspace.path(), "mutable.png");

    assert_ne!(curator.feature_vector(&path).unwrap(), before);
    let (_, second) = curator.build_index(&inputs(&[path, other])).unwrap();
    assert_eq!(second.cached, 2);
    assert_eq!(second.extracted, 0);
}

#[test]
fn test_undecodable_image_skipped() {
    let workspace = tempdir().unwrap();
    let mut paths = scenario_a(workspace.path());
    let broken = workspace.path().join("broken.png");
    std::fs::write(&broken, b"not an image at all").unwrap();
    paths.push(broken.clone());

    let (index, stats) = curator(&workspace).build_index(&inputs(&paths)).unwrap();
    assert_eq!(stats.indexed, 5);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failures[0].path, broken);
    assert!(!index.contains(&broken));
}

#[test]
fn test_persist_and_restore() {
    let workspace = tempdir().unwrap();
    let paths = scenario_a(workspace.path());

    for strategy in strategies() {
        let mut config = test_config(&workspace);
        config.index = strategy.clone();
        let curator = Curator::new(config).unwrap();
        let (index, _) = curator.build_index(&inputs(&paths)).unwrap();

        let dir = workspace.path().join(format!("index-{}", strategy.name()));
        index.persist(&dir).unwrap();
        let restored = SimilarityIndex::restore(&dir).unwrap();

        assert_eq!(restored.len(), index.len());
        assert_eq!(restored.strategy(), strategy);
        assert_eq!(
            curator.find_similar(&restored, &paths[2], 4, false).unwrap(),
            curator.find_similar(&index, &paths[2], 4, false).unwrap()
        );
    }
}

#[test]
fn test_restore_rejects_truncated_path_list() {
    let workspace = tempdir().unwrap();
    let paths = scenario_a(workspace.path());
    let (index, _) = curator(&workspace).build_index(&inputs(&paths)).unwrap();

    let dir = workspace.path().join("index");
    index.persist(&dir).unwrap();

    let mut manifest = image_curator_core::index::IndexManifest::read(&dir).unwrap();
    manifest.paths.pop();
    manifest.vector_count -= 1;
    manifest.write(&dir).unwrap();

    assert!(matches!(
        SimilarityIndex::restore(&dir),
        Err(Error::IndexCorrupt(_))
    ));
}

#[test]
fn test_cancelled_build_returns_nothing() {
    let workspace = tempdir().unwrap();
    let paths = scenario_a(workspace.path());
    let curator = curator(&workspace);

    curator.cancel_token().cancel();
    assert!(matches!(
        curator.build_index(&inputs(&paths)),
        Err(Error::Interrupted)
    ));
}
