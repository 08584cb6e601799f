//! Corpus acquisition and canonical text derivation.
//!
//! A corpus is an ordered sequence of [`CorpusUnit`]s. Each unit carries
//! the exact text that will be embedded plus the structured fields that
//! end up on the stored [`Document`]. Order is significant: the builder
//! assigns row ids by position.

pub mod diff;
pub mod files;
pub mod pull_requests;

use std::collections::BTreeMap;

pub use diff::{DiffSummary, extract_diff_summary};
pub use files::load_documents;
pub use pull_requests::{
    FieldValue, IssueRecord, PullRequestRecord, load_pull_requests, pull_request_units,
};

use crate::config::{CorpusConfig, CorpusKind};
use crate::documents::Document;
use crate::error::IndexResult;

/// One raw text unit ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusUnit {
    /// Canonical text handed to the embedding provider.
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

impl CorpusUnit {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Converts into a document; the row id is assigned by the metadata store.
    #[must_use]
    pub fn into_document(self) -> Document {
        Document {
            source_fields: self.fields,
            ..Document::new(self.text)
        }
    }
}

/// Loads the corpus described by the configuration.
pub fn load_corpus(config: &CorpusConfig) -> IndexResult<Vec<CorpusUnit>> {
    match config.kind {
        CorpusKind::Documents => load_documents(&config.source),
        CorpusKind::PullRequests => {
            let records = load_pull_requests(&config.source)?;
            Ok(pull_request_units(&records, &config.placeholders))
        }
    }
}
