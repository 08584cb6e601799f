//! Type-safe wrappers and core types for the vector index.
//!
//! Row ids, dimensions and embedding vectors are newtypes so that a raw
//! `usize` or `Vec<f32>` can never be passed where a validated value is
//! expected. Every `EmbeddingVector` is unit length by construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output dimension of the all-MiniLM-L6-v2 sentence model.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Tolerance used when checking that a vector has unit L2 norm.
pub const NORM_TOLERANCE: f32 = 1e-4;

/// Dense, zero-based row identifier shared by a vector and its document.
///
/// Unlike most ids in the crate, zero is a valid row: row ids are the
/// position of a unit in the corpus snapshot of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u32);

impl RowId {
    /// Creates a new `RowId`.
    #[must_use]
    pub const fn new(row: u32) -> Self {
        Self(row)
    }

    /// Creates a row id from a corpus position.
    ///
    /// Returns `None` if the position does not fit in a `u32`.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the row as a slice index.
    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent
/// dimension mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit-length embedding bound to the row it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    row_id: RowId,
    values: Vec<f32>,
}

impl EmbeddingVector {
    /// Normalizes `raw` to unit L2 norm and binds it to `row_id`.
    ///
    /// # Errors
    /// `ZeroVector` if the raw embedding has zero (or non-finite) norm,
    /// `InvalidDimension` if it is empty.
    pub fn normalized(row_id: RowId, raw: Vec<f32>) -> Result<Self, VectorError> {
        if raw.is_empty() {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Embedding has no components",
            });
        }
        let mut values = raw;
        if !normalize_in_place(&mut values) {
            return Err(VectorError::ZeroVector { row: Some(row_id) });
        }
        Ok(Self { row_id, values })
    }

    /// Normalizes a query embedding; query vectors carry no meaningful row.
    pub fn query(raw: Vec<f32>) -> Result<Self, VectorError> {
        Self::normalized(RowId::new(0), raw).map_err(|e| match e {
            VectorError::ZeroVector { .. } => VectorError::ZeroVector { row: None },
            other => other,
        })
    }

    #[must_use]
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Euclidean norm, accumulated in f64 to keep long vectors stable.
#[must_use]
pub fn l2_norm(values: &[f32]) -> f32 {
    l2_norm_f64(values) as f32
}

fn l2_norm_f64(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

/// Scales `values` to unit length.
///
/// Returns `false` when the norm is zero or not finite, leaving the
/// input untouched. The division happens in f64 so components near
/// `f32::MAX` still scale down instead of overflowing the norm.
#[must_use]
pub fn normalize_in_place(values: &mut [f32]) -> bool {
    let norm = l2_norm_f64(values);
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for v in values.iter_mut() {
        *v = (f64::from(*v) / norm) as f32;
    }
    true
}

/// Dot product of two equal-length slices.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance of two equal-length slices.
///
/// For unit vectors this equals `2 - 2 * dot(a, b)`, so ordering by it is
/// the same as ordering by cosine similarity, descending.
#[must_use]
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Cannot build an index from an empty corpus\nSuggestion: Check that the corpus source contains at least one usable document"
    )]
    EmptyCorpus,

    #[error(
        "Embedding {} has zero norm and cannot be normalized\nSuggestion: Check the input text and the embedding model output", describe_row(.row)
    )]
    ZeroVector { row: Option<RowId> },

    #[error(
        "Row ids must be dense and ordered: position {position} holds row {row}\nSuggestion: Assign row ids from the corpus order before building"
    )]
    NonContiguousRows { position: usize, row: RowId },

    #[error("Invalid result count k={0}\nSuggestion: Request at least one result")]
    InvalidK(usize),

    #[error(
        "Index data is corrupt: {0}\nSuggestion: Rebuild the index with 'ragindex index'"
    )]
    CorruptIndex(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version of ragindex"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),
}

fn describe_row(row: &Option<RowId>) -> String {
    match row {
        Some(row) => format!("for row {row}"),
        None => "for query".to_string(),
    }
}
