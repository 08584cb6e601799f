//! Query-time retrieval against a published generation.
//!
//! A [`RetrievalEngine`] is an immutable snapshot: one verified
//! generation plus the embedding provider used to encode queries. It is
//! `Send + Sync` and is shared between threads behind an `Arc`.
//! [`EngineHandle`] owns the current snapshot and swaps it on explicit
//! reload; callers holding an older snapshot keep serving from it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::documents::{Document, MetadataStore};
use crate::error::{IndexError, IndexResult};
use crate::generation::{GenerationManifest, GenerationStore, LoadedGeneration};
use crate::vector::{EmbeddingGenerator, EmbeddingVector, FlatIndex, SearchHit, VectorError};

/// A document returned for a query, with its squared L2 distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub document: Document,
    pub distance: f32,
}

impl RetrievedDocument {
    #[must_use]
    pub fn cosine_similarity(&self) -> f32 {
        1.0 - self.distance / 2.0
    }
}

pub struct RetrievalEngine {
    manifest: GenerationManifest,
    index: FlatIndex,
    metadata: MetadataStore,
    embedder: Arc<dyn EmbeddingGenerator>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("generation", &self.manifest.generation)
            .field("vectors", &self.index.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl RetrievalEngine {
    /// Loads the current generation of `store`.
    pub fn load(
        store: &GenerationStore,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> IndexResult<Self> {
        Self::from_loaded(store.load_current()?, embedder)
    }

    /// Loads a specific generation, current or not.
    pub fn load_generation(
        store: &GenerationStore,
        generation: u64,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> IndexResult<Self> {
        Self::from_loaded(store.load(generation)?, embedder)
    }

    /// Wraps an already verified generation.
    ///
    /// # Errors
    /// - `EmptyIndex` if the generation holds no vectors
    /// - `GenerationInconsistent` if index and metadata disagree in size
    pub fn from_loaded(
        loaded: LoadedGeneration,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> IndexResult<Self> {
        let LoadedGeneration {
            manifest,
            index,
            metadata,
            ..
        } = loaded;

        if index.is_empty() {
            return Err(IndexError::EmptyIndex {
                generation: manifest.generation,
            });
        }
        if index.len() != metadata.len() {
            return Err(IndexError::GenerationInconsistent {
                generation: manifest.generation,
                reason: format!(
                    "index holds {} vectors but metadata holds {} documents",
                    index.len(),
                    metadata.len()
                ),
            });
        }
        if manifest.model != embedder.model_name() {
            tracing::warn!(
                generation = manifest.generation,
                built_with = %manifest.model,
                querying_with = embedder.model_name(),
                "query model differs from the model the generation was built with"
            );
        }

        Ok(Self {
            manifest,
            index,
            metadata,
            embedder,
        })
    }

    /// Returns up to `k` documents nearest to `query_text`, closest first.
    ///
    /// # Errors
    /// - `InvalidK` if `k == 0`
    /// - `ExternalProvider` if the query cannot be embedded
    /// - `ZeroVector` if the query embedding has zero norm
    /// - `DimensionMismatch` if the provider's dimension differs from the index
    pub fn retrieve(&self, query_text: &str, k: usize) -> IndexResult<Vec<RetrievedDocument>> {
        if k == 0 {
            return Err(VectorError::InvalidK(k).into());
        }
        let raw = self
            .embedder
            .embed(query_text)
            .map_err(|e| IndexError::ExternalProvider {
                provider: self.embedder.model_name().to_string(),
                operation: "query embedding".to_string(),
                reason: e.to_string(),
            })?;
        self.retrieve_by_embedding(raw, k)
    }

    /// Same as [`retrieve`](Self::retrieve) for a precomputed raw embedding.
    pub fn retrieve_by_embedding(
        &self,
        raw: Vec<f32>,
        k: usize,
    ) -> IndexResult<Vec<RetrievedDocument>> {
        let query = EmbeddingVector::query(raw)?;
        let hits = self.index.search(&query, k)?;
        self.resolve(&hits)
    }

    /// Documents only, in distance order.
    pub fn retrieve_documents(&self, query_text: &str, k: usize) -> IndexResult<Vec<Document>> {
        Ok(self
            .retrieve(query_text, k)?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    fn resolve(&self, hits: &[SearchHit]) -> IndexResult<Vec<RetrievedDocument>> {
        hits.iter()
            .map(|hit| {
                Ok(RetrievedDocument {
                    document: self.metadata.get(hit.row_id)?.clone(),
                    distance: hit.distance,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    #[must_use]
    pub fn manifest(&self) -> &GenerationManifest {
        &self.manifest
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    #[must_use]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }
}

/// Shared owner of the engine currently being served.
pub struct EngineHandle {
    store: GenerationStore,
    embedder: Arc<dyn EmbeddingGenerator>,
    current: RwLock<Arc<RetrievalEngine>>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("store", &self.store)
            .field("current", &*self.current.read())
            .finish()
    }
}

impl EngineHandle {
    /// Loads the current generation of `store`.
    pub fn open(
        store: GenerationStore,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> IndexResult<Self> {
        let engine = RetrievalEngine::load(&store, Arc::clone(&embedder))?;
        Ok(Self {
            store,
            embedder,
            current: RwLock::new(Arc::new(engine)),
        })
    }

    /// The engine to use for the next query. Holding the snapshot keeps
    /// that generation alive in memory regardless of later reloads.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RetrievalEngine> {
        Arc::clone(&self.current.read())
    }

    /// Loads whatever generation is current on disk and swaps it in.
    ///
    /// On failure the previously loaded engine stays in place.
    pub fn reload(&self) -> IndexResult<u64> {
        let engine = RetrievalEngine::load(&self.store, Arc::clone(&self.embedder))?;
        let generation = engine.generation();
        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, Arc::new(engine))
        };
        tracing::info!(
            from = previous.generation(),
            to = generation,
            "reloaded retrieval engine"
        );
        Ok(generation)
    }

    pub fn retrieve(&self, query_text: &str, k: usize) -> IndexResult<Vec<RetrievedDocument>> {
        self.snapshot().retrieve(query_text, k)
    }

    #[must_use]
    pub fn store(&self) -> &GenerationStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::corpus::CorpusUnit;
    use crate::vector::{StaticEmbeddingGenerator, VectorDimension};
    use tempfile::TempDir;

    fn embedder() -> Arc<dyn EmbeddingGenerator> {
        Arc::new(
            StaticEmbeddingGenerator::new(VectorDimension::new(2).unwrap())
                .with("north", vec![0.0, 1.0])
                .unwrap()
                .with("east", vec![1.0, 0.0])
                .unwrap()
                .with("north-east", vec![1.0, 1.0])
                .unwrap()
                .with("nothing", vec![0.0, 0.0])
                .unwrap(),
        )
    }

    fn build(store: &GenerationStore, texts: &[&str]) {
        IndexBuilder::new(store.clone(), embedder())
            .build(texts.iter().map(|t| CorpusUnit::new(*t)).collect())
            .unwrap();
    }

    #[test]
    fn test_retrieve_orders_by_distance() {
        let temp_dir = TempDir::new().unwrap();
        let store = GenerationStore::new(temp_dir.path());
        build(&store, &["east", "north"]);

        let engine = RetrievalEngine::load(&store, embedder()).unwrap();
        let hits = engine.retrieve("north", 5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.text, "north");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 2.0).abs() < 1e-5);
        assert!(hits[1].cosine_similarity().abs() < 1e-5);
    }

    #[test]
    fn test_equidistant_hits_follow_row_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = GenerationStore::new(temp_dir.path());
        build(&store, &["north", "east"]);

        let engine = RetrievalEngine::load(&store, embedder()).unwrap();
        let docs = engine.retrieve_documents("north-east", 2).unwrap();
        let texts: Vec<_> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, ["north", "east"]);
    }

    #[test]
    fn test_rejects_k_zero_and_zero_query() {
        let temp_dir = TempDir::new().unwrap();
        let store = GenerationStore::new(temp_dir.path());
        build(&store, &["east"]);
        let engine = RetrievalEngine::load(&store, embedder()).unwrap();

        assert!(matches!(
            engine.retrieve("east", 0),
            Err(IndexError::Vector(VectorError::InvalidK(0)))
        ));
        assert!(matches!(
            engine.retrieve("nothing", 1),
            Err(IndexError::Vector(VectorError::ZeroVector { row: None }))
        ));
    }

    #[test]
    fn test_dimension_mismatch_on_query() {
        let temp_dir = TempDir::new().unwrap();
        let store = GenerationStore::new(temp_dir.path());
        build(&store, &["east"]);
        let engine = RetrievalEngine::load(&store, embedder()).unwrap();

        assert!(matches!(
            engine.retrieve_by_embedding(vec![1.0, 0.0, 0.0], 1),
            Err(IndexError::Vector(VectorError::DimensionMismatch { expected: 2, actual: 3 }))
        ));
    }

    #[test]
    fn test_handle_reload_swaps_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = GenerationStore::new(temp_dir.path());
        build(&store, &["east"]);

        let handle = EngineHandle::open(store.clone(), embedder()).unwrap();
        let old = handle.snapshot();
        assert_eq!(old.generation(), 1);

        build(&store, &["east", "north"]);
        assert_eq!(handle.snapshot().generation(), 1);
        assert_eq!(handle.reload().unwrap(), 2);

        assert_eq!(handle.snapshot().len(), 2);
        // The old snapshot is still usable.
        assert_eq!(old.retrieve("north", 3).unwrap().len(), 1);
    }
}
