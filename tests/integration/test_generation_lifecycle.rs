//! Publishing, verification, retention and rollback of generations.

use crate::common::{CONCERT, LIBRARY, MUSEUM, PARK, TestStore, units};
use ragindex::documents::{Document, MetadataStore};
use ragindex::generation::{
    ArtifactInfo, DOCUMENTS_FILE, GenerationManifest, INDEX_FILE, LOCK_FILE,
};
use ragindex::{IndexError, RetrievalEngine, VectorError};

#[test]
fn test_round_trip_preserves_rows() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM, CONCERT]);

    let loaded = project.store.load_current().unwrap();
    assert_eq!(loaded.manifest.generation, 1);
    assert_eq!(loaded.manifest.vector_count, 3);
    assert_eq!(loaded.manifest.dim, 4);

    let texts: Vec<_> = loaded.metadata.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, [PARK, MUSEUM, CONCERT]);
    for (position, doc) in loaded.metadata.iter().enumerate() {
        assert_eq!(doc.row_id.as_index(), position);
    }

    // Museum was embedded as [0, 2, 0, 0] and stored normalized.
    let museum = loaded.index.vector(loaded.metadata.iter().nth(1).unwrap().row_id).unwrap();
    assert_eq!(museum, [0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_rebuilding_same_corpus_is_idempotent() {
    let project = TestStore::new();
    let first = project.build(&[PARK, MUSEUM, CONCERT]).manifest;
    let second = project.build(&[PARK, MUSEUM, CONCERT]).manifest;
    assert_eq!(second.generation, first.generation + 1);

    assert_eq!(first.artifacts.vectors.sha256, second.artifacts.vectors.sha256);
    assert_eq!(first.artifacts.documents.sha256, second.artifacts.documents.sha256);
    assert_eq!(first.artifacts.index.sha256, second.artifacts.index.sha256);

    let a = project.store.load(first.generation).unwrap();
    let b = project.store.load(second.generation).unwrap();
    assert_eq!(a.index, b.index);
    assert_eq!(a.metadata, b.metadata);
}

#[test]
fn test_empty_corpus_publishes_nothing() {
    let project = TestStore::new();
    let err = project.builder().build(Vec::new()).unwrap_err();
    assert!(matches!(err, IndexError::Vector(VectorError::EmptyCorpus)));
    assert_eq!(project.store.current_generation().unwrap(), None);
    assert!(matches!(
        project.store.load_current(),
        Err(IndexError::NoGeneration { .. })
    ));
}

#[test]
fn test_metadata_shorter_than_vectors_is_rejected() {
    let project = TestStore::new();
    let report = project.build(&[PARK, MUSEUM, CONCERT, LIBRARY, PARK]);
    let dir = project.store.generation_dir(report.manifest.generation);

    // Replace the metadata with four documents and keep the manifest
    // checksums valid so only the count disagreement remains.
    let four = MetadataStore::build([PARK, MUSEUM, CONCERT, LIBRARY].map(Document::new))
        .unwrap()
        .serialize()
        .unwrap();
    std::fs::write(dir.join(DOCUMENTS_FILE), &four).unwrap();
    let mut manifest = GenerationManifest::load(&dir).unwrap();
    manifest.artifacts.documents = ArtifactInfo::describe(DOCUMENTS_FILE, &four);
    manifest.save(&dir).unwrap();

    let err = project.store.load_current().unwrap_err();
    match err {
        IndexError::GenerationInconsistent { generation, reason } => {
            assert_eq!(generation, 1);
            assert!(reason.contains("5 rows"), "{reason}");
            assert!(reason.contains("4 documents"), "{reason}");
        }
        other => panic!("expected GenerationInconsistent, got {other:?}"),
    }
    assert!(RetrievalEngine::load(&project.store, crate::common::scenario_embedder()).is_err());
}

#[test]
fn test_tampered_artifact_is_named() {
    let project = TestStore::new();
    let report = project.build(&[PARK, MUSEUM]);
    let index_path = project
        .store
        .generation_dir(report.manifest.generation)
        .join(INDEX_FILE);

    let mut bytes = std::fs::read(&index_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&index_path, bytes).unwrap();

    match project.store.load_current().unwrap_err() {
        IndexError::GenerationInconsistent { reason, .. } => {
            assert!(reason.contains(INDEX_FILE), "{reason}");
            assert!(reason.contains("checksum"), "{reason}");
        }
        other => panic!("expected GenerationInconsistent, got {other:?}"),
    }
}

#[test]
fn test_second_builder_is_locked_out() {
    let project = TestStore::new();
    project.build(&[PARK]);

    let lock = project.store.lock().unwrap();
    assert!(project.root().join(LOCK_FILE).exists());

    let err = project.builder().build(units(&[MUSEUM])).unwrap_err();
    assert!(matches!(err, IndexError::BuildLocked { .. }));
    assert_eq!(project.store.current_generation().unwrap(), Some(1));

    drop(lock);
    assert!(!project.root().join(LOCK_FILE).exists());
    assert_eq!(project.build(&[MUSEUM]).manifest.generation, 2);
}

#[test]
fn test_failed_build_keeps_previous_generation_servable() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM]);

    let err = project
        .builder()
        .build(units(&[CONCERT, "not in the embedding table"]))
        .unwrap_err();
    assert_eq!(err.status_code(), "EXTERNAL_PROVIDER_ERROR");

    let engine = RetrievalEngine::load(&project.store, crate::common::scenario_embedder()).unwrap();
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.len(), 2);
    assert!(!project.root().join(LOCK_FILE).exists());
}

#[test]
fn test_retention_keeps_newest_generations() {
    let project = TestStore::new();
    for _ in 0..4 {
        project
            .builder()
            .with_retention(2)
            .build(units(&[PARK, MUSEUM]))
            .unwrap();
    }
    assert_eq!(project.store.generation_numbers().unwrap(), [3, 4]);
    assert_eq!(project.store.current_generation().unwrap(), Some(4));

    let listed = project.store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[1].is_current);
    assert!(!listed[0].is_current);
    assert_eq!(listed[0].manifest.as_ref().unwrap().vector_count, 2);
}

#[test]
fn test_rollback_serves_older_generation() {
    let project = TestStore::new();
    project.builder().with_retention(3).build(units(&[PARK])).unwrap();
    project
        .builder()
        .with_retention(3)
        .build(units(&[PARK, MUSEUM, CONCERT]))
        .unwrap();

    let manifest = project.store.rollback(1).unwrap();
    assert_eq!(manifest.vector_count, 1);
    let engine = RetrievalEngine::load(&project.store, crate::common::scenario_embedder()).unwrap();
    assert_eq!(engine.generation(), 1);

    assert!(matches!(
        project.store.rollback(99),
        Err(IndexError::GenerationNotFound { generation: 99, .. })
    ));
    assert_eq!(project.store.current_generation().unwrap(), Some(1));

    // Numbering continues past the highest generation on disk.
    assert_eq!(project.build(&[LIBRARY]).manifest.generation, 3);
}
