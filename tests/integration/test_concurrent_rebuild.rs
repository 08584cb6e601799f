//! Readers keep serving while generations are rebuilt and swapped in.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::common::{CONCERT, LIBRARY, MUSEUM, PARK, TestStore, scenario_embedder};
use ragindex::EngineHandle;
use ragindex::vector::squared_l2_distance;

const READERS: usize = 4;

#[test]
fn test_rebuild_while_serving() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM, CONCERT]);
    let handle = EngineHandle::open(project.store.clone(), scenario_embedder()).unwrap();

    let corpora: [&[&str]; 4] = [
        &[CONCERT, PARK, MUSEUM],
        &[LIBRARY, MUSEUM, PARK, CONCERT],
        &[MUSEUM, PARK],
        &[PARK, LIBRARY, CONCERT, MUSEUM],
    ];
    let done = AtomicBool::new(false);
    let queries = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for reader in 0..READERS {
            let handle = &handle;
            let done = &done;
            let queries = &queries;
            scope.spawn(move || {
                let texts = [PARK, MUSEUM];
                let mut round = reader;
                while !done.load(Ordering::Acquire) || round < reader + 20 {
                    let engine = handle.snapshot();
                    let query = texts[round % texts.len()];
                    let hits = engine.retrieve(query, 3).unwrap();

                    // Every corpus contains both query texts, so the exact
                    // match must come back first with its own document.
                    assert_eq!(hits[0].document.text, query);
                    assert!(hits[0].distance.abs() < 1e-6);
                    for hit in &hits {
                        let doc = engine.metadata().get(hit.document.row_id).unwrap();
                        assert_eq!(doc, &hit.document);
                        let stored = engine.index().vector(hit.document.row_id).unwrap();
                        let top = engine.index().vector(hits[0].document.row_id).unwrap();
                        assert!((squared_l2_distance(stored, top) - hit.distance).abs() < 1e-5);
                    }
                    queries.fetch_add(1, Ordering::Relaxed);
                    round += 1;
                }
            });
        }

        for corpus in corpora {
            project.build(corpus);
            let generation = handle.reload().unwrap();
            assert_eq!(handle.snapshot().generation(), generation);
            assert_eq!(handle.snapshot().len(), corpus.len());
        }
        done.store(true, Ordering::Release);
    });

    assert!(queries.load(Ordering::Relaxed) >= READERS * 20);
    assert_eq!(handle.snapshot().generation(), 5);
}

#[test]
fn test_old_snapshot_survives_reload_and_pruning() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM]);
    let handle = EngineHandle::open(project.store.clone(), scenario_embedder()).unwrap();
    let old = handle.snapshot();

    for _ in 0..3 {
        project.build(&[CONCERT, LIBRARY, PARK, MUSEUM]);
    }
    handle.reload().unwrap();
    assert!(!project.store.generation_dir(1).exists());

    let hits = old.retrieve(MUSEUM, 5).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document.text, MUSEUM);
    assert_eq!(handle.snapshot().len(), 4);
}

#[test]
fn test_failed_reload_keeps_current_engine() {
    let project = TestStore::new();
    project.build(&[PARK, MUSEUM]);
    let handle = EngineHandle::open(project.store.clone(), scenario_embedder()).unwrap();

    project.build(&[PARK, MUSEUM, CONCERT]);
    let vectors = project
        .store
        .generation_dir(2)
        .join(ragindex::generation::VECTORS_FILE);
    std::fs::write(&vectors, b"truncated").unwrap();

    assert!(handle.reload().is_err());
    assert_eq!(handle.snapshot().generation(), 1);
    assert_eq!(handle.retrieve(PARK, 1).unwrap()[0].document.text, PARK);
}
