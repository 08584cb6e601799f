//! Error types for the retrieval index
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Vector-level failures
//! live in [`VectorError`] and are wrapped here; everything that concerns
//! generations, corpora and external collaborators is defined directly.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::documents::MetadataError;
use crate::vector::{RowId, VectorError};

/// Main error type for building, loading and querying generations
#[derive(Error, Debug)]
pub enum IndexError {
    /// Dimension, normalization, empty-corpus and index-format errors
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Metadata artifact format errors
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize '{path}': {reason}")]
    Serialization { path: PathBuf, reason: String },

    /// Metadata store lookups
    #[error("Row {row} not found: the metadata store holds {len} documents")]
    RowNotFound { row: RowId, len: usize },

    /// Generation state errors
    #[error("Generation {generation} contains no vectors and cannot be served")]
    EmptyIndex { generation: u64 },

    #[error("Generation {generation} is inconsistent: {reason}")]
    GenerationInconsistent { generation: u64, reason: String },

    #[error("No published generation found under '{path}'. Run 'ragindex index' first.")]
    NoGeneration { path: PathBuf },

    #[error("Generation {generation} does not exist under '{path}'")]
    GenerationNotFound { generation: u64, path: PathBuf },

    #[error("Another build holds the lock at '{path}' ({holder})")]
    BuildLocked { path: PathBuf, holder: String },

    /// External collaborators (embedding model, completion service)
    #[error("{provider} failed during {operation}: {reason}")]
    ExternalProvider {
        provider: String,
        operation: String,
        reason: String,
    },

    /// Corpus acquisition errors
    #[error("Failed to load corpus from '{path}': {reason}")]
    CorpusLoad { path: PathBuf, reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(inner) => match inner {
                VectorError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
                VectorError::InvalidDimension { .. } => "INVALID_DIMENSION",
                VectorError::EmptyCorpus => "EMPTY_CORPUS",
                VectorError::ZeroVector { .. } => "ZERO_VECTOR",
                VectorError::NonContiguousRows { .. } => "NON_CONTIGUOUS_ROWS",
                VectorError::InvalidK(_) => "INVALID_K",
                VectorError::CorruptIndex(_) => "CORRUPT_INDEX",
                VectorError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
                VectorError::VersionMismatch { .. } => "VERSION_MISMATCH",
                VectorError::Storage(_) => "STORAGE_ERROR",
            },
            Self::Metadata(_) => "METADATA_FORMAT_ERROR",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::RowNotFound { .. } => "ROW_NOT_FOUND",
            Self::EmptyIndex { .. } => "EMPTY_INDEX",
            Self::GenerationInconsistent { .. } => "GENERATION_INCONSISTENT",
            Self::NoGeneration { .. } => "NO_GENERATION",
            Self::GenerationNotFound { .. } => "GENERATION_NOT_FOUND",
            Self::BuildLocked { .. } => "BUILD_LOCKED",
            Self::ExternalProvider { .. } => "EXTERNAL_PROVIDER_ERROR",
            Self::CorpusLoad { .. } => "CORPUS_LOAD_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::GenerationInconsistent { .. }
            | Self::RowNotFound { .. }
            | Self::Vector(VectorError::CorruptIndex(_)) => vec![
                "Run 'ragindex index' to publish a fresh generation",
                "Or run 'ragindex rollback <N>' to serve a retained older generation",
            ],
            Self::NoGeneration { .. } | Self::EmptyIndex { .. } => vec![
                "Run 'ragindex index' to build the first generation",
                "Check that index_path in settings.toml points at the right directory",
            ],
            Self::BuildLocked { .. } => vec![
                "Wait for the running build to finish",
                "Locks left by a dead process on Linux are taken over on the next build",
                "Otherwise, if no build is running, delete the .build.lock file at the path above",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "The query model differs from the model the index was built with",
                "Rebuild the index or switch embedding.model back in settings.toml",
            ],
            Self::ExternalProvider { .. } => vec![
                "Check that the embedding model or completion endpoint is reachable",
                "The previous generation is untouched; retry when the provider recovers",
            ],
            Self::CorpusLoad { .. } => vec![
                "Check that the corpus path exists and contains UTF-8 text",
                "Pull-request corpora must be a JSON array or JSON Lines file",
            ],
            Self::FileRead { .. } | Self::FileWrite { .. } => vec![
                "Check that the file exists and you have the required permissions",
                "Check available disk space",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for attaching paths to I/O failures
pub trait IoResultExt<T> {
    fn read_context(self, path: &Path) -> IndexResult<T>;

    fn write_context(self, path: &Path) -> IndexResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn read_context(self, path: &Path) -> IndexResult<T> {
        self.map_err(|source| IndexError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_context(self, path: &Path) -> IndexResult<T> {
        self.map_err(|source| IndexError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err: IndexError = VectorError::EmptyCorpus.into();
        assert_eq!(err.status_code(), "EMPTY_CORPUS");

        let err = IndexError::GenerationInconsistent {
            generation: 3,
            reason: "count".to_string(),
        };
        assert_eq!(err.status_code(), "GENERATION_INCONSISTENT");
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_io_context_keeps_path() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.read_context(Path::new("/tmp/x")).unwrap_err();
        assert!(err.to_string().contains("/tmp/x"));
        assert_eq!(err.status_code(), "FILE_READ_ERROR");
    }

    #[test]
    fn test_build_locked_names_lock_file() {
        let err = IndexError::BuildLocked {
            path: PathBuf::from("/srv/index/.build.lock"),
            holder: "pid=7".to_string(),
        };
        assert!(err.to_string().contains("/srv/index/.build.lock"));
        assert!(err.recovery_suggestions().iter().any(|s| s.contains(".build.lock")));
    }
}
