//! Vector storage and exact nearest-neighbor search.
//!
//! This module holds the numeric half of a generation: unit-length
//! embeddings, the flat search index built from them, and the on-disk
//! vector data artifact.
//!
//! # Architecture
//! Embeddings come from an [`EmbeddingGenerator`], are normalized into
//! [`EmbeddingVector`]s, and are loaded into a [`FlatIndex`] that answers
//! k-nearest queries by squared L2 distance. Because every stored vector
//! is unit length, nearest-by-L2 is the same as most-similar-by-cosine.

mod embedding;
mod index;
mod storage;
mod types;

pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HASHING_MODEL_NAME, HashingEmbeddingGenerator,
    StaticEmbeddingGenerator, create_generator, models_dir, parse_embedding_model,
};
pub use index::{FlatIndex, SearchHit};
pub use storage::MmapVectorStorage;
pub use types::{
    EmbeddingVector, NORM_TOLERANCE, RowId, VECTOR_DIMENSION_384, VectorDimension, VectorError,
    dot, l2_norm, normalize_in_place, squared_l2_distance,
};
