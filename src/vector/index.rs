//! Exact nearest-neighbor index over unit-length vectors.
//!
//! Every query is compared against every stored row (O(rows x dim)).
//! Corpora here are tens to low thousands of documents, where a flat scan
//! is fast and, unlike clustered indexes, never misses a neighbor.
//!
//! # Ordering
//! Results are ordered by ascending squared L2 distance; equal distances
//! are ordered by ascending row id so the same query always returns the
//! same list.

use std::cmp::Ordering;

use crate::vector::storage::{MmapVectorStorage, decode_header, decode_payload, encode_matrix};
use crate::vector::types::{
    EmbeddingVector, NORM_TOLERANCE, RowId, VectorDimension, VectorError, l2_norm,
    squared_l2_distance,
};

/// Magic bytes to identify serialized index files.
const INDEX_MAGIC: &[u8; 4] = b"RIDX";

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row_id: RowId,
    /// Squared Euclidean distance to the query; `2 - 2 * cosine`.
    pub distance: f32,
}

impl SearchHit {
    /// Cosine similarity recovered from the squared distance.
    #[must_use]
    pub fn cosine_similarity(&self) -> f32 {
        1.0 - self.distance / 2.0
    }

    fn rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row_id.cmp(&other.row_id))
    }
}

/// Flat (brute-force) vector index.
///
/// Rows are stored contiguously in `row_id` order; row `i` occupies
/// `data[i * dim..(i + 1) * dim]`. The index is immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: VectorDimension,
    data: Vec<f32>,
    vector_count: usize,
}

impl FlatIndex {
    /// Builds an index from vectors whose row ids are `0..n` in order.
    ///
    /// # Errors
    /// - `EmptyCorpus` if `vectors` is empty
    /// - `DimensionMismatch` if any vector disagrees with the first one
    /// - `NonContiguousRows` if row ids are not dense and in order
    pub fn build(vectors: &[EmbeddingVector]) -> Result<Self, VectorError> {
        let first = vectors.first().ok_or(VectorError::EmptyCorpus)?;
        let dimension = VectorDimension::new(first.dim())?;

        let mut data = Vec::with_capacity(vectors.len() * dimension.get());
        for (position, vector) in vectors.iter().enumerate() {
            if vector.row_id().as_index() != position {
                return Err(VectorError::NonContiguousRows {
                    position,
                    row: vector.row_id(),
                });
            }
            dimension.validate_vector(vector.values())?;
            data.extend_from_slice(vector.values());
        }

        Ok(Self {
            dimension,
            data,
            vector_count: vectors.len(),
        })
    }

    /// Rebuilds the index from a vector data artifact.
    pub fn from_storage(storage: &MmapVectorStorage) -> Result<Self, VectorError> {
        let data = storage.read_all();
        Self::from_raw(storage.dimension(), storage.vector_count(), data)
    }

    fn from_raw(
        dimension: VectorDimension,
        vector_count: usize,
        data: Vec<f32>,
    ) -> Result<Self, VectorError> {
        debug_assert_eq!(data.len(), vector_count * dimension.get());
        for (row, values) in data.chunks_exact(dimension.get()).enumerate() {
            let norm = l2_norm(values);
            if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
                return Err(VectorError::CorruptIndex(format!(
                    "row {row} has norm {norm}, expected 1.0"
                )));
            }
        }
        Ok(Self {
            dimension,
            data,
            vector_count,
        })
    }

    /// Returns the `k` rows nearest to `query`.
    ///
    /// `k` larger than the index is clamped to the number of rows.
    ///
    /// # Errors
    /// - `InvalidK` if `k == 0`
    /// - `DimensionMismatch` if the query dimension differs from the index
    pub fn search(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<SearchHit>, VectorError> {
        if k == 0 {
            return Err(VectorError::InvalidK(k));
        }
        self.dimension.validate_vector(query.values())?;

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension.get())
            .enumerate()
            .map(|(row, values)| SearchHit {
                row_id: RowId::new(row as u32),
                distance: squared_l2_distance(query.values(), values),
            })
            .collect();

        let k = k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, SearchHit::rank);
            hits.truncate(k);
        }
        hits.sort_unstable_by(SearchHit::rank);

        tracing::debug!(k, rows = self.vector_count, "flat search complete");
        Ok(hits)
    }

    /// Returns the stored vector for `row`.
    #[must_use]
    pub fn vector(&self, row: RowId) -> Option<&[f32]> {
        if row.as_index() >= self.vector_count {
            return None;
        }
        let dim = self.dimension.get();
        let start = row.as_index() * dim;
        Some(&self.data[start..start + dim])
    }

    /// Iterates stored rows in `row_id` order.
    pub fn rows(&self) -> impl Iterator<Item = (RowId, &[f32])> {
        self.data
            .chunks_exact(self.dimension.get())
            .enumerate()
            .map(|(row, values)| (RowId::new(row as u32), values))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vector_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vector_count == 0
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Serializes the index: header (magic, version, dim, count) + rows.
    pub fn serialize(&self) -> Result<Vec<u8>, VectorError> {
        encode_matrix(
            INDEX_MAGIC,
            self.dimension,
            self.vector_count,
            self.data.chunks_exact(self.dimension.get()),
        )
    }

    /// Restores an index from [`FlatIndex::serialize`] output.
    ///
    /// # Errors
    /// `CorruptIndex` if the byte length disagrees with the declared shape,
    /// the magic is wrong, or a row is not unit length.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, VectorError> {
        let header = decode_header(INDEX_MAGIC, bytes)?;
        Self::from_raw(header.dimension, header.vector_count, decode_payload(bytes))
    }
}
