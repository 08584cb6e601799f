//! Memory-mapped storage for the vector data artifact.
//!
//! The vector data artifact is the raw `[vector_count, dim]` matrix of a
//! generation, row-major and in `row_id` order. It is written once when a
//! generation is staged and only ever read afterwards, so reads go
//! through a read-only memory map.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic, version, dimension, vector count
//! - Vectors: contiguous f32 rows in little-endian format
//!
//! The same header layout is shared with the serialized search index; the
//! two are told apart by their magic bytes.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::vector::types::{EmbeddingVector, RowId, VectorDimension, VectorError};

/// Current storage format version.
pub(crate) const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
pub(crate) const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector data files.
const MAGIC_BYTES: &[u8; 4] = b"RVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Dimension and row count decoded from a matrix header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MatrixHeader {
    pub dimension: VectorDimension,
    pub vector_count: usize,
}

/// Encodes a row-major f32 matrix behind a 16-byte header.
pub(crate) fn encode_matrix<'a>(
    magic: &[u8; 4],
    dimension: VectorDimension,
    vector_count: usize,
    rows: impl Iterator<Item = &'a [f32]>,
) -> Result<Vec<u8>, VectorError> {
    let count = u32::try_from(vector_count).map_err(|_| {
        VectorError::CorruptIndex(format!("{vector_count} vectors exceed the u32 row limit"))
    })?;
    let dim = u32::try_from(dimension.get()).map_err(|_| VectorError::InvalidDimension {
        dimension: dimension.get(),
        reason: "Dimension exceeds the u32 header field",
    })?;

    let mut out =
        Vec::with_capacity(HEADER_SIZE + vector_count * dimension.get() * BYTES_PER_F32);
    out.extend_from_slice(magic);
    out.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
    out.extend_from_slice(&dim.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    let mut written = 0usize;
    for row in rows {
        dimension.validate_vector(row)?;
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
        written += 1;
    }
    if written != vector_count {
        return Err(VectorError::CorruptIndex(format!(
            "header declares {vector_count} vectors but {written} were written"
        )));
    }
    Ok(out)
}

/// Validates the header of `bytes` and checks that the payload length
/// matches the declared shape exactly.
pub(crate) fn decode_header(magic: &[u8; 4], bytes: &[u8]) -> Result<MatrixHeader, VectorError> {
    if bytes.len() < HEADER_SIZE {
        return Err(VectorError::CorruptIndex(format!(
            "{} bytes is too small to contain a header",
            bytes.len()
        )));
    }
    if &bytes[0..4] != magic {
        return Err(VectorError::CorruptIndex("Invalid magic bytes".to_string()));
    }

    let version = read_u32(bytes, 4);
    if version != STORAGE_VERSION {
        return Err(VectorError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }

    let dim = read_u32(bytes, 8) as usize;
    let dimension = VectorDimension::new(dim)
        .map_err(|_| VectorError::CorruptIndex("Header declares dimension 0".to_string()))?;
    let vector_count = read_u32(bytes, 12) as usize;

    let expected = vector_count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(BYTES_PER_F32))
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| {
            VectorError::CorruptIndex(format!(
                "declared shape [{vector_count}, {dim}] overflows"
            ))
        })?;
    if bytes.len() != expected {
        return Err(VectorError::CorruptIndex(format!(
            "declared shape [{vector_count}, {dim}] needs {expected} bytes, found {}",
            bytes.len()
        )));
    }

    Ok(MatrixHeader {
        dimension,
        vector_count,
    })
}

/// Decodes the payload following a validated header into f32 values.
pub(crate) fn decode_payload(bytes: &[u8]) -> Vec<f32> {
    bytes[HEADER_SIZE..]
        .chunks_exact(BYTES_PER_F32)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Read-only, memory-mapped view of a vector data artifact.
#[derive(Debug)]
pub struct MmapVectorStorage {
    path: PathBuf,
    mmap: Mmap,
    header: MatrixHeader,
}

impl MmapVectorStorage {
    /// Encodes `vectors` (already in `row_id` order) as a vector data artifact.
    pub fn encode(
        dimension: VectorDimension,
        vectors: &[EmbeddingVector],
    ) -> Result<Vec<u8>, VectorError> {
        encode_matrix(
            MAGIC_BYTES,
            dimension,
            vectors.len(),
            vectors.iter().map(EmbeddingVector::values),
        )
    }

    /// Writes a vector data artifact and syncs it to disk.
    pub fn write(
        path: impl AsRef<Path>,
        dimension: VectorDimension,
        vectors: &[EmbeddingVector],
    ) -> Result<u64, VectorError> {
        let bytes = Self::encode(dimension, vectors)?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(bytes.len() as u64)
    }

    /// Maps an existing vector data artifact and validates its shape.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(VectorError::Storage(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Vector storage file not found: {path:?}"),
            )));
        }

        let file = File::open(&path)?;
        // SAFETY: generation artifacts are never modified after publish;
        // a new generation always lands in a fresh directory.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let header = decode_header(MAGIC_BYTES, &mmap)?;

        Ok(Self { path, mmap, header })
    }

    /// Reads one row. This is a bounds-checked copy out of the map.
    #[must_use]
    pub fn read_vector(&self, row: RowId) -> Option<Vec<f32>> {
        if row.as_index() >= self.header.vector_count {
            return None;
        }
        let dim = self.header.dimension.get();
        let start = HEADER_SIZE + row.as_index() * dim * BYTES_PER_F32;
        let end = start + dim * BYTES_PER_F32;
        Some(
            self.mmap[start..end]
                .chunks_exact(BYTES_PER_F32)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Reads the whole matrix, row-major.
    #[must_use]
    pub fn read_all(&self) -> Vec<f32> {
        decode_payload(&self.mmap)
    }

    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.header.vector_count
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.header.dimension
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw mapped artifact, header included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Returns the size of the storage file in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(row: u32, raw: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector::normalized(RowId::new(row), raw).unwrap()
    }

    #[test]
    fn test_write_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.bin");
        let dim = VectorDimension::new(3).unwrap();
        let vectors = vec![
            unit(0, vec![1.0, 0.0, 0.0]),
            unit(1, vec![0.0, 3.0, 4.0]),
        ];

        let written = MmapVectorStorage::write(&path, dim, &vectors).unwrap();
        let storage = MmapVectorStorage::open(&path).unwrap();

        assert_eq!(storage.file_size(), written);
        assert_eq!(storage.vector_count(), 2);
        assert_eq!(storage.dimension(), dim);
        assert_eq!(storage.read_vector(RowId::new(1)).unwrap(), vec![0.0, 0.6, 0.8]);
        assert!(storage.read_vector(RowId::new(2)).is_none());
        assert_eq!(storage.read_all().len(), 6);
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.bin");
        let dim = VectorDimension::new(2).unwrap();
        let bytes =
            MmapVectorStorage::encode(dim, &[unit(0, vec![1.0, 1.0]), unit(1, vec![1.0, 0.0])])
                .unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = MmapVectorStorage::open(&path).unwrap_err();
        assert!(matches!(err, VectorError::CorruptIndex(_)), "got {err:?}");
    }

    #[test]
    fn test_wrong_magic_is_corrupt() {
        let dim = VectorDimension::new(2).unwrap();
        let mut bytes = MmapVectorStorage::encode(dim, &[unit(0, vec![1.0, 0.0])]).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_header(MAGIC_BYTES, &bytes),
            Err(VectorError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_future_version_rejected() {
        let dim = VectorDimension::new(2).unwrap();
        let mut bytes = MmapVectorStorage::encode(dim, &[unit(0, vec![1.0, 0.0])]).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            decode_header(MAGIC_BYTES, &bytes),
            Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = MmapVectorStorage::open(temp_dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, VectorError::Storage(_)));
    }
}
