//! Metadata store: the ordered documents of one generation.
//!
//! A document's `row_id` is its position in the store and matches the
//! row of its vector in the index built from the same corpus pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{IndexError, IndexResult};
use crate::vector::RowId;

/// Current on-disk format of the metadata artifact.
const METADATA_FORMAT_VERSION: u32 = 1;

/// A stored corpus unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub row_id: RowId,
    /// The canonical text that was embedded.
    pub text: String,
    /// Structured fields carried over from the source record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_fields: BTreeMap<String, String>,
}

impl Document {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            row_id: RowId::new(0),
            text: text.into(),
            source_fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_fields.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.source_fields.get(key).map(String::as_str)
    }
}

/// Errors specific to the metadata artifact
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata artifact is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Metadata position {position} holds row {row}; rows must be dense and ordered")]
    RowMismatch { position: usize, row: RowId },

    #[error("Metadata format version {actual} is newer than supported version {expected}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Metadata store holds more documents than a row id can address")]
    TooManyDocuments,
}

#[derive(Serialize, Deserialize)]
struct MetadataArtifact {
    format_version: u32,
    documents: Vec<Document>,
}

/// Ordered, immutable document collection keyed by row id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    documents: Vec<Document>,
}

impl MetadataStore {
    /// Builds a store, assigning each document's row id from its position.
    pub fn build(documents: impl IntoIterator<Item = Document>) -> Result<Self, MetadataError> {
        let documents = documents
            .into_iter()
            .enumerate()
            .map(|(position, mut doc)| {
                doc.row_id = RowId::from_index(position).ok_or(MetadataError::TooManyDocuments)?;
                Ok(doc)
            })
            .collect::<Result<Vec<_>, MetadataError>>()?;
        Ok(Self { documents })
    }

    /// Looks up a document by row id.
    pub fn get(&self, row: RowId) -> IndexResult<&Document> {
        self.documents
            .get(row.as_index())
            .ok_or(IndexError::RowNotFound {
                row,
                len: self.documents.len(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, MetadataError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            format_version: u32,
            documents: &'a [Document],
        }
        Ok(serde_json::to_vec(&Borrowed {
            format_version: METADATA_FORMAT_VERSION,
            documents: &self.documents,
        })?)
    }

    /// Restores a store, checking that row ids are dense and in order.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, MetadataError> {
        let artifact: MetadataArtifact = serde_json::from_slice(bytes)?;
        if artifact.format_version > METADATA_FORMAT_VERSION {
            return Err(MetadataError::VersionMismatch {
                expected: METADATA_FORMAT_VERSION,
                actual: artifact.format_version,
            });
        }
        for (position, doc) in artifact.documents.iter().enumerate() {
            if doc.row_id.as_index() != position {
                return Err(MetadataError::RowMismatch {
                    position,
                    row: doc.row_id,
                });
            }
        }
        Ok(Self {
            documents: artifact.documents,
        })
    }
}
