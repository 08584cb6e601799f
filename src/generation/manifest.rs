//! Generation manifest: shape, provenance and checksums of one generation.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IndexError, IndexResult, IoResultExt};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const INDEX_FILE: &str = "index.bin";

/// Newest manifest layout this build understands.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Size and digest of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub file: String,
    pub bytes: u64,
    pub sha256: String,
}

impl ArtifactInfo {
    #[must_use]
    pub fn describe(file: &str, contents: &[u8]) -> Self {
        Self {
            file: file.to_string(),
            bytes: contents.len() as u64,
            sha256: calculate_sha256(contents),
        }
    }

    /// Checks `contents` against the recorded size and digest.
    pub fn verify(&self, contents: &[u8]) -> Result<(), String> {
        if contents.len() as u64 != self.bytes {
            return Err(format!(
                "{} is {} bytes, manifest records {}",
                self.file,
                contents.len(),
                self.bytes
            ));
        }
        let actual = calculate_sha256(contents);
        if actual != self.sha256 {
            return Err(format!(
                "{} checksum mismatch: expected {}, found {actual}",
                self.file, self.sha256
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub vectors: ArtifactInfo,
    pub documents: ArtifactInfo,
    pub index: ArtifactInfo,
}

/// Describes a published generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub format_version: u32,
    pub generation: u64,
    pub dim: usize,
    pub vector_count: usize,
    /// Embedding model that produced the vectors.
    pub model: String,
    /// RFC 3339 creation time (UTC)
    pub created_at: String,
    pub artifacts: ArtifactSet,
}

impl GenerationManifest {
    #[must_use]
    pub fn new(
        generation: u64,
        dim: usize,
        vector_count: usize,
        model: impl Into<String>,
        artifacts: ArtifactSet,
    ) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            generation,
            dim,
            vector_count,
            model: model.into(),
            created_at: Utc::now().to_rfc3339(),
            artifacts,
        }
    }

    /// Writes `manifest.json` into `dir` and syncs it.
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(self).map_err(|e| IndexError::Serialization {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut file = File::create(&path).write_context(&path)?;
        file.write_all(&json).write_context(&path)?;
        file.sync_all().write_context(&path)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> IndexResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let json = fs::read(&path).read_context(&path)?;
        serde_json::from_slice(&json).map_err(|e| IndexError::Serialization {
            path,
            reason: e.to_string(),
        })
    }
}

/// Lowercase hex SHA-256 of `contents`.
#[must_use]
pub fn calculate_sha256(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}
