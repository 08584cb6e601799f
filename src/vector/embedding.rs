//! Embedding providers.
//!
//! The index never computes embeddings itself; it consumes an
//! [`EmbeddingGenerator`]. Three implementations ship with the crate:
//!
//! - [`FastEmbedGenerator`]: local ONNX sentence models via fastembed
//!   (all-MiniLM-L6-v2 by default)
//! - [`HashingEmbeddingGenerator`]: deterministic feature hashing, no model
//!   download, useful offline and in CI
//! - [`StaticEmbeddingGenerator`]: a fixed text-to-vector table for tests
//!   and demos
//!
//! Providers return raw vectors. Normalization is the caller's job so
//! that every provider goes through the same rule.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::vector::{VectorDimension, VectorError};

/// Model name that selects [`HashingEmbeddingGenerator`].
pub const HASHING_MODEL_NAME: &str = "hash-v1";

/// Trait for generating embeddings from text.
///
/// Implementations must be deterministic for identical input and must
/// return exactly one vector per input text, in input order.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Identifier recorded in generation manifests.
    fn model_name(&self) -> &str;

    /// Embeds a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let mut embeddings = self.generate_embeddings(&[text])?;
        if embeddings.len() != 1 {
            return Err(VectorError::EmbeddingFailed(format!(
                "expected 1 embedding, provider returned {}",
                embeddings.len()
            )));
        }
        Ok(embeddings.remove(0))
    }
}

/// Builds the generator selected by configuration.
pub fn create_generator(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    if config.model == HASHING_MODEL_NAME {
        let dimension = VectorDimension::new(config.hash_dimension)?;
        return Ok(Arc::new(HashingEmbeddingGenerator::new(dimension)));
    }
    let model = parse_embedding_model(&config.model)?;
    Ok(Arc::new(FastEmbedGenerator::with_model(
        model,
        config.model.clone(),
        config.show_download_progress,
    )?))
}

/// Directory where downloaded models are cached.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("ragindex").join("models"))
        .unwrap_or_else(|| PathBuf::from(".ragindex/models"))
}

/// Maps a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" | "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" | "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" | "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, {HASHING_MODEL_NAME}"
        ))),
    }
}

/// FastEmbed implementation backed by a local ONNX sentence model.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: VectorDimension,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Create a generator with the all-MiniLM-L6-v2 model.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new() -> Result<Self, VectorError> {
        Self::with_model(
            EmbeddingModel::AllMiniLML6V2,
            "AllMiniLML6V2".to_string(),
            false,
        )
    }

    /// Create a generator for a specific model.
    pub fn with_model(
        model: EmbeddingModel,
        model_name: String,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(models_dir())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Measure the output size instead of trusting a table.
        let sample = text_model
            .embed(vec!["dimension check"], None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to measure model output: {e}"))
            })?;
        let dim = sample.first().map_or(0, Vec::len);
        let dimension = VectorDimension::new(dim)?;

        tracing::info!(model = %model_name, dimension = dim, "embedding model loaded");

        Ok(Self {
            model: Mutex::new(text_model),
            model_name,
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lower-cased alphanumeric words and adjacent word pairs are hashed with
/// SHA-256 into signed, weighted buckets. Texts sharing words land close
/// together; the output is stable across platforms and releases.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingGenerator {
    dimension: VectorDimension,
}

impl HashingEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dims = self.dimension.get();
        let mut vector = vec![0.0f32; dims];

        for feature in hash_features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(head);

            let bucket = (hash % dims as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + ((hash >> 48) & 0xFF) as f32 / 255.0;
            vector[bucket] += sign * weight;
        }
        vector
    }
}

impl EmbeddingGenerator for HashingEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}

fn hash_features(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect();

    let mut features = Vec::with_capacity(words.len() * 2);
    for (i, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(i + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

/// Fixed lookup-table embedder.
///
/// Every text the caller will embed must be registered up front; anything
/// else fails with `EmbeddingFailed`, the same way a remote provider
/// failure would surface.
#[derive(Debug)]
pub struct StaticEmbeddingGenerator {
    dimension: VectorDimension,
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl StaticEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Registers the vector returned for `text`.
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Result<Self, VectorError> {
        self.insert(text, vector)?;
        Ok(self)
    }

    pub fn insert(&mut self, text: impl Into<String>, vector: Vec<f32>) -> Result<(), VectorError> {
        self.dimension.validate_vector(&vector)?;
        self.table.insert(text.into(), vector);
        Ok(())
    }

    /// Number of `generate_embeddings` calls served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl EmbeddingGenerator for StaticEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        texts
            .iter()
            .map(|text| {
                self.table.get(*text).cloned().ok_or_else(|| {
                    VectorError::EmbeddingFailed(format!("no static embedding for '{text}'"))
                })
            })
            .collect()
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "static"
    }
}
