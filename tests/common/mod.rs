//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragindex::builder::{BuildReport, IndexBuilder};
use ragindex::corpus::CorpusUnit;
use ragindex::generation::GenerationStore;
use ragindex::vector::{EmbeddingGenerator, StaticEmbeddingGenerator, VectorDimension};
use tempfile::TempDir;

pub const PARK: &str = "walk in the park";
pub const MUSEUM: &str = "visit a museum";
pub const CONCERT: &str = "attend a concert";
pub const LIBRARY: &str = "read in the library";
pub const OUTDOOR: &str = "outdoor activity";
/// Maps to the zero vector.
pub const NOTHING: &str = "nothing at all";

/// An isolated generation store in a temp directory.
pub struct TestStore {
    pub dir: TempDir,
    pub store: GenerationStore,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = GenerationStore::new(dir.path().join("index"));
        Self { dir, store }
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Writes a file relative to the temp directory.
    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn builder(&self) -> IndexBuilder {
        IndexBuilder::new(self.store.clone(), scenario_embedder())
    }

    pub fn build(&self, texts: &[&str]) -> BuildReport {
        self.builder()
            .build(units(texts))
            .expect("Failed to build generation")
    }
}

/// Fixed 4-dimensional embeddings for the activity scenario.
pub fn scenario_embedder() -> Arc<dyn EmbeddingGenerator> {
    let generator = StaticEmbeddingGenerator::new(VectorDimension::new(4).expect("valid dim"))
        .with(PARK, vec![1.0, 0.0, 0.0, 0.0])
        .and_then(|g| g.with(MUSEUM, vec![0.0, 2.0, 0.0, 0.0]))
        .and_then(|g| g.with(CONCERT, vec![0.0, 0.0, 0.5, 0.0]))
        .and_then(|g| g.with(LIBRARY, vec![0.0, 0.0, 0.0, 3.0]))
        .and_then(|g| g.with(OUTDOOR, vec![0.9, 0.3, 0.1, 0.0]))
        .and_then(|g| g.with(NOTHING, vec![0.0; 4]))
        .expect("Failed to build static embedder");
    Arc::new(generator)
}

pub fn units(texts: &[&str]) -> Vec<CorpusUnit> {
    texts.iter().map(|text| CorpusUnit::new(*text)).collect()
}
