//! Pull-request records and their canonical text.
//!
//! Mined records are loosely shaped: any field may be missing, null, or
//! an empty string. Every field is resolved into a [`FieldValue`] up
//! front so that text construction never has to guess.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::CorpusUnit;
use super::diff::extract_diff_summary;
use crate::config::PlaceholderConfig;
use crate::error::{IndexError, IndexResult};

/// Sentinel the miner writes when a commit message could not be fetched.
const UNAVAILABLE: &str = "N/A";

/// A field that is either present with non-blank content or absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    Present(String),
    #[default]
    Absent,
}

impl FieldValue {
    /// Blank strings and the miner's `N/A` sentinel count as absent.
    #[must_use]
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(s) if !s.trim().is_empty() && s.trim() != UNAVAILABLE => Self::Present(s),
            _ => Self::Absent,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Present(s) => Some(s),
            Self::Absent => None,
        }
    }

    /// The value, or `placeholder` when absent.
    #[must_use]
    pub fn or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.as_deref().unwrap_or(placeholder)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::from_option(Some(value.to_string()))
    }
}

/// The closed issue linked to a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IssueRecord {
    pub number: FieldValue,
    pub title: FieldValue,
    pub closed_at: FieldValue,
    /// Non-blank comment bodies, in thread order.
    pub comments: Vec<String>,
}

/// One mined pull request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullRequestRecord {
    pub title: FieldValue,
    pub commit_message: FieldValue,
    pub body_message: FieldValue,
    pub diff: FieldValue,
    pub issue: Option<IssueRecord>,
    pub created_at: FieldValue,
}

impl PullRequestRecord {
    /// Records without a title or a commit message are not indexed.
    #[must_use]
    pub fn has_minimum_content(&self) -> bool {
        self.title.is_present() && self.commit_message.is_present()
    }

    /// Title of the linked issue, absent when there is no issue.
    #[must_use]
    pub fn issue_title(&self) -> &FieldValue {
        static ABSENT: FieldValue = FieldValue::Absent;
        self.issue.as_ref().map_or(&ABSENT, |issue| &issue.title)
    }

    /// The text embedded for this record.
    ///
    /// Fields appear in a fixed order; absent ones are replaced by their
    /// placeholder so records with partial data stay comparable.
    #[must_use]
    pub fn canonical_text(&self, placeholders: &PlaceholderConfig) -> String {
        let diff_summary = self
            .diff
            .as_deref()
            .map(extract_diff_summary)
            .filter(|summary| !summary.is_empty())
            .map(|summary| summary.to_string());

        let comments = self
            .issue
            .as_ref()
            .filter(|issue| !issue.comments.is_empty())
            .map(|issue| issue.comments.join(" "));

        format!(
            "Title: {} Commit Message: {} Diff Summary: {} Issue: {} Comments: {}",
            self.title.or(""),
            self.commit_message.or(""),
            diff_summary.as_deref().unwrap_or(&placeholders.diff),
            self.issue_title().or(&placeholders.issue),
            comments.as_deref().unwrap_or(&placeholders.comments),
        )
    }

    /// Query text used when a record is the question rather than the corpus.
    #[must_use]
    pub fn query_text(&self, placeholders: &PlaceholderConfig) -> String {
        format!(
            "Title: {} Commit Message: {} Body Message: {} Issue: {}",
            self.title.or(""),
            self.commit_message.or(""),
            self.body_message.or(""),
            self.issue_title().or(&placeholders.issue),
        )
    }

    /// Structured fields carried onto the stored document.
    #[must_use]
    pub fn source_fields(&self) -> BTreeMap<String, String> {
        [
            ("title", &self.title),
            ("commit_message", &self.commit_message),
            ("issue_title", self.issue_title()),
            ("body_message", &self.body_message),
            ("created_at", &self.created_at),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key.to_string(), v.to_string())))
        .collect()
    }

    #[must_use]
    pub fn to_unit(&self, placeholders: &PlaceholderConfig) -> CorpusUnit {
        CorpusUnit {
            text: self.canonical_text(placeholders),
            fields: self.source_fields(),
        }
    }
}

/// Canonical units for every record passing the minimum-content check.
///
/// Skipped records are logged and receive no row id.
pub fn pull_request_units(
    records: &[PullRequestRecord],
    placeholders: &PlaceholderConfig,
) -> Vec<CorpusUnit> {
    let mut skipped = 0usize;
    let units: Vec<CorpusUnit> = records
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            if record.has_minimum_content() {
                Some(record.to_unit(placeholders))
            } else {
                skipped += 1;
                tracing::warn!(
                    position,
                    title = record.title.or("<missing>"),
                    "skipping pull request without title or commit message"
                );
                None
            }
        })
        .collect();

    if skipped > 0 {
        tracing::info!(kept = units.len(), skipped, "filtered pull-request corpus");
    }
    units
}

/// Loads records from a JSON array or a JSON Lines file.
pub fn load_pull_requests(path: &Path) -> IndexResult<Vec<PullRequestRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| IndexError::CorpusLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_pull_requests(&content).map_err(|reason| IndexError::CorpusLoad {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_pull_requests(content: &str) -> Result<Vec<PullRequestRecord>, String> {
    if content.trim_start().starts_with('[') {
        let raw: Vec<RawPullRequest> =
            serde_json::from_str(content).map_err(|e| format!("invalid JSON array: {e}"))?;
        return Ok(raw.into_iter().map(PullRequestRecord::from).collect());
    }
    // A single, possibly pretty-printed, record
    if let Ok(raw) = serde_json::from_str::<RawPullRequest>(content) {
        return Ok(vec![PullRequestRecord::from(raw)]);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<RawPullRequest>(line)
                .map(PullRequestRecord::from)
                .map_err(|e| format!("line {}: {e}", index + 1))
        })
        .collect()
}

#[derive(Deserialize)]
struct RawPullRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    commit_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    body_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    diff: Option<String>,
    #[serde(default)]
    issue: Option<RawIssue>,
    #[serde(default, deserialize_with = "lenient_string")]
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default, deserialize_with = "lenient_string")]
    issue_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    closed_at: Option<String>,
    #[serde(default)]
    comments: Option<Vec<Option<String>>>,
}

impl From<RawPullRequest> for PullRequestRecord {
    fn from(raw: RawPullRequest) -> Self {
        Self {
            title: FieldValue::from_option(raw.title),
            commit_message: FieldValue::from_option(raw.commit_message),
            body_message: FieldValue::from_option(raw.body_message),
            diff: FieldValue::from_option(raw.diff),
            issue: raw.issue.map(IssueRecord::from),
            created_at: FieldValue::from_option(raw.created_at),
        }
    }
}

impl From<RawIssue> for IssueRecord {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: FieldValue::from_option(raw.issue_number),
            title: FieldValue::from_option(raw.title),
            closed_at: FieldValue::from_option(raw.closed_at),
            comments: raw
                .comments
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .filter(|c| !c.trim().is_empty())
                .collect(),
        }
    }
}

/// Accepts strings, numbers and booleans; null becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
