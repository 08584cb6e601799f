//! Index builder: corpus in, published generation out.
//!
//! One build is one transaction. The corpus is embedded in batches,
//! every vector is normalized, the index and the metadata store are built
//! from the same ordered sequence, and the result is published under the
//! store's build lock. Any failure before the pointer swap leaves the
//! previously published generation untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::config::Settings;
use crate::corpus::CorpusUnit;
use crate::documents::MetadataStore;
use crate::error::{IndexError, IndexResult};
use crate::generation::{GenerationManifest, GenerationStore, StagedGeneration};
use crate::vector::{
    EmbeddingGenerator, EmbeddingVector, FlatIndex, MmapVectorStorage, RowId, VectorError,
};

/// Called after each embedding batch with (units embedded so far, total).
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: GenerationManifest,
    /// Generations deleted by retention after publishing.
    pub pruned: Vec<u64>,
    pub elapsed: Duration,
}

pub struct IndexBuilder {
    store: GenerationStore,
    embedder: Arc<dyn EmbeddingGenerator>,
    batch_size: usize,
    retain_generations: usize,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("store", &self.store)
            .field("model", &self.embedder.model_name())
            .field("batch_size", &self.batch_size)
            .field("retain_generations", &self.retain_generations)
            .finish()
    }
}

impl IndexBuilder {
    pub fn new(store: GenerationStore, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            store,
            embedder,
            batch_size: 64,
            retain_generations: 2,
            progress: None,
        }
    }

    /// Builder configured from `settings` (batch size, retention, index path).
    pub fn from_settings(settings: &Settings, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self::new(GenerationStore::new(settings.resolved_index_path()), embedder)
            .with_batch_size(settings.embedding.batch_size)
            .with_retention(settings.build.retain_generations)
    }

    /// Texts per provider call. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retain_generations: usize) -> Self {
        self.retain_generations = retain_generations;
        self
    }

    #[must_use]
    pub fn with_progress(
        mut self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    /// Embeds `units`, publishes them as a new generation and prunes old ones.
    ///
    /// # Errors
    /// - `BuildLocked` if another build holds the store
    /// - `EmptyCorpus` if `units` is empty
    /// - `ExternalProvider` if the embedding provider fails or returns the
    ///   wrong number of vectors
    /// - `ZeroVector` / `DimensionMismatch` for degenerate embeddings
    pub fn build(&self, units: Vec<CorpusUnit>) -> IndexResult<BuildReport> {
        let started = Instant::now();
        let lock = self.store.lock()?;

        if units.is_empty() {
            return Err(VectorError::EmptyCorpus.into());
        }
        tracing::info!(
            units = units.len(),
            model = self.embedder.model_name(),
            batch_size = self.batch_size,
            "building generation"
        );

        let vectors = self.embed_all(&units)?;
        let index = FlatIndex::build(&vectors)?;
        let metadata = MetadataStore::build(units.into_iter().map(CorpusUnit::into_document))?;

        let dimension = index.dimension();
        let staged = StagedGeneration {
            dim: dimension.get(),
            vector_count: index.len(),
            model: self.embedder.model_name().to_string(),
            vectors: MmapVectorStorage::encode(dimension, &vectors)?,
            documents: metadata.serialize()?,
            index: index.serialize()?,
        };
        let manifest = self.store.publish(&lock, staged)?;

        let pruned = match self.store.prune(&lock, self.retain_generations) {
            Ok(pruned) => pruned,
            Err(e) => {
                tracing::warn!(error = %e, "retention pass failed; old generations kept");
                Vec::new()
            }
        };

        let elapsed = started.elapsed();
        tracing::info!(
            generation = manifest.generation,
            vectors = manifest.vector_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "build complete"
        );
        Ok(BuildReport {
            manifest,
            pruned,
            elapsed,
        })
    }

    /// Embeds every unit in order and normalizes the results.
    ///
    /// Batching only changes how many texts go into each provider call;
    /// the output is the same for every batch size.
    pub fn embed_all(&self, units: &[CorpusUnit]) -> IndexResult<Vec<EmbeddingVector>> {
        let total = units.len();
        let expected_dim = self.embedder.dimension().get();
        let mut raw: Vec<Vec<f32>> = Vec::with_capacity(total);

        for (batch, chunk) in units.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = chunk.iter().map(|unit| unit.text.as_str()).collect();
            let embeddings = self.embedder.generate_embeddings(&texts).map_err(|e| {
                self.provider_error(format!("embedding batch {batch}"), e.to_string())
            })?;

            if embeddings.len() != chunk.len() {
                return Err(self.provider_error(
                    format!("embedding batch {batch}"),
                    format!(
                        "returned {} embeddings for {} texts",
                        embeddings.len(),
                        chunk.len()
                    ),
                ));
            }
            raw.extend(embeddings);

            tracing::debug!(batch, embedded = raw.len(), total, "embedded batch");
            if let Some(progress) = &self.progress {
                progress(raw.len(), total);
            }
        }

        raw.into_par_iter()
            .enumerate()
            .map(|(position, values)| {
                let row = RowId::from_index(position).ok_or_else(|| {
                    VectorError::CorruptIndex(format!("row {position} exceeds the u32 row limit"))
                })?;
                if values.len() != expected_dim {
                    return Err(VectorError::DimensionMismatch {
                        expected: expected_dim,
                        actual: values.len(),
                    });
                }
                EmbeddingVector::normalized(row, values)
            })
            .collect::<Result<Vec<_>, VectorError>>()
            .map_err(IndexError::from)
    }

    fn provider_error(&self, operation: String, reason: String) -> IndexError {
        IndexError::ExternalProvider {
            provider: self.embedder.model_name().to_string(),
            operation,
            reason,
        }
    }
}
