//! Query-time behavior against published generations.

use std::sync::Arc;

use crate::common::{
    CONCERT, LIBRARY, MUSEUM, NOTHING, OUTDOOR, PARK, TestStore, scenario_embedder, units,
};
use ragindex::vector::{HashingEmbeddingGenerator, VectorDimension};
use ragindex::{IndexBuilder, IndexError, RetrievalEngine, VectorError};

#[test]
fn test_outdoor_activity_scenario() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM, CONCERT]);
    let engine = RetrievalEngine::load(&project.store, scenario_embedder()).unwrap();

    let hits = engine.retrieve(OUTDOOR, 2).unwrap();
    let texts: Vec<_> = hits.iter().map(|hit| hit.document.text.as_str()).collect();
    assert_eq!(texts, [PARK, MUSEUM]);
    assert!(hits[0].distance <= hits[1].distance);

    // Same answer on every call.
    for _ in 0..5 {
        assert_eq!(engine.retrieve(OUTDOOR, 2).unwrap(), hits);
    }
}

#[test]
fn test_results_are_bounded_and_ordered() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM, CONCERT, LIBRARY]);
    let engine = RetrievalEngine::load(&project.store, scenario_embedder()).unwrap();

    for k in 1..=6 {
        for query in [PARK, MUSEUM, OUTDOOR, LIBRARY] {
            let hits = engine.retrieve(query, k).unwrap();
            assert_eq!(hits.len(), k.min(4));
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }
}

#[test]
fn test_distance_matches_cosine_identity() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM, CONCERT]);
    let engine = RetrievalEngine::load(&project.store, scenario_embedder()).unwrap();

    for hit in engine.retrieve(OUTDOOR, 3).unwrap() {
        let stored = engine.index().vector(hit.document.row_id).unwrap();
        let query = [0.9f32, 0.3, 0.1, 0.0];
        let norm = query.iter().map(|v| v * v).sum::<f32>().sqrt();
        let cos: f32 = stored.iter().zip(query).map(|(a, b)| a * b / norm).sum();
        assert!((hit.distance - (2.0 - 2.0 * cos)).abs() < 1e-5);
        assert!((hit.cosine_similarity() - cos).abs() < 1e-5);
    }
}

#[test]
fn test_invalid_queries_are_rejected() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM]);
    let engine = RetrievalEngine::load(&project.store, scenario_embedder()).unwrap();

    assert!(matches!(
        engine.retrieve(OUTDOOR, 0),
        Err(IndexError::Vector(VectorError::InvalidK(0)))
    ));
    assert!(matches!(
        engine.retrieve(NOTHING, 2),
        Err(IndexError::Vector(VectorError::ZeroVector { row: None }))
    ));
    assert!(matches!(
        engine.retrieve("unknown text", 2),
        Err(IndexError::ExternalProvider { .. })
    ));
}

#[test]
fn test_query_model_dimension_mismatch() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM]);
    let wrong = Arc::new(HashingEmbeddingGenerator::new(VectorDimension::new(8).unwrap()));
    let engine = RetrievalEngine::load(&project.store, wrong).unwrap();

    assert!(matches!(
        engine.retrieve(PARK, 1),
        Err(IndexError::Vector(VectorError::DimensionMismatch { expected: 4, actual: 8 }))
    ));
}

#[test]
fn test_batch_size_does_not_change_generation() {
    let corpus = [PARK, MUSEUM, CONCERT, LIBRARY, PARK];
    let mut digests = Vec::new();

    for batch_size in [1, 2, 3, 64] {
        let project = TestStore::new();
        let report = project
            .builder()
            .with_batch_size(batch_size)
            .build(units(&corpus))
            .unwrap();
        digests.push((
            report.manifest.artifacts.vectors.sha256,
            report.manifest.artifacts.index.sha256,
            report.manifest.artifacts.documents.sha256,
        ));
    }
    assert!(digests.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_hashing_embedder_over_document_directory() {
    let project = TestStore::new();
    project.add_file("kb/forks.txt", "Repository forks can be listed with get_forks");
    project.add_file("kb/stars.txt", "Stargazers are returned by get_stargazers");
    project.add_file(
        "kb/nested/issues.txt",
        "Issues are listed with get_issues and a state filter",
    );

    let units = ragindex::corpus::load_documents(&project.dir.path().join("kb")).unwrap();
    assert_eq!(units.len(), 3);

    let embedder = Arc::new(HashingEmbeddingGenerator::new(VectorDimension::new(128).unwrap()));
    let report = IndexBuilder::new(project.store.clone(), embedder.clone())
        .build(units)
        .unwrap();
    assert_eq!(report.manifest.model, "hash-v1");
    assert_eq!(report.manifest.dim, 128);

    let engine = RetrievalEngine::load(&project.store, embedder).unwrap();
    let hits = engine
        .retrieve("Stargazers are returned by get_stargazers", 3)
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].document.field("path"), Some("stars.txt"));
    assert!(hits[0].distance.abs() < 1e-5);
}
