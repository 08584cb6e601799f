//! Configuration module for the retrieval index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RAGINDEX_` and use double
//! underscores to separate nested levels:
//! - `RAGINDEX_EMBEDDING__BATCH_SIZE=16` sets `embedding.batch_size`
//! - `RAGINDEX_RETRIEVAL__TOP_K=5` sets `retrieval.top_k`
//! - `RAGINDEX_GENERATION__MODEL=llama3.2` sets `generation.model`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the workspace configuration.
pub const CONFIG_DIR: &str = ".ragindex";

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "RAGINDEX_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Root of the generation store
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .ragindex is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Corpus source settings
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Query-time settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Completion service settings
    #[serde(default)]
    pub generation: CompletionConfig,

    /// Build and retention settings
    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings, or "hash-v1" for the offline hasher
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of texts sent to the provider per call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Output dimension of the hashing embedder
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,

    /// Show a progress bar while a model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorpusKind {
    /// A directory of plain-text knowledge-base files
    Documents,
    /// A JSON or JSON Lines file of pull-request records
    PullRequests,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_kind")]
    pub kind: CorpusKind,

    /// Directory (documents) or file (pull requests) to index
    #[serde(default = "default_corpus_source")]
    pub source: PathBuf,

    /// Text substituted for absent pull-request fields
    #[serde(default)]
    pub placeholders: PlaceholderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PlaceholderConfig {
    #[serde(default = "default_issue_placeholder")]
    pub issue: String,

    #[serde(default = "default_comments_placeholder")]
    pub comments: String,

    #[serde(default = "default_diff_placeholder")]
    pub diff: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Number of documents returned when the caller does not say
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompletionConfig {
    /// Streaming generate endpoint
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BuildConfig {
    /// How many published generations to keep on disk (including current)
    #[serde(default = "default_retain_generations")]
    pub retain_generations: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".ragindex/index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_hash_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_corpus_kind() -> CorpusKind {
    CorpusKind::Documents
}
fn default_corpus_source() -> PathBuf {
    PathBuf::from("kb")
}
fn default_issue_placeholder() -> String {
    "No associated issue".to_string()
}
fn default_comments_placeholder() -> String {
    "No comments".to_string()
}
fn default_diff_placeholder() -> String {
    "No diff summary".to_string()
}
fn default_top_k() -> usize {
    3
}
fn default_completion_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}
fn default_completion_model() -> String {
    "llama3.1".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_retain_generations() -> usize {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            embedding: EmbeddingConfig::default(),
            corpus: CorpusConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: CompletionConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            hash_dimension: default_hash_dimension(),
            show_download_progress: true,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            kind: default_corpus_kind(),
            source: default_corpus_source(),
            placeholders: PlaceholderConfig::default(),
        }
    }
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            issue: default_issue_placeholder(),
            comments: default_comments_placeholder(),
            diff: default_diff_placeholder(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            retain_generations: default_retain_generations(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .ragindex directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .ragindex is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Cannot read configuration file: {e}"))?;
        toml::from_str::<Settings>(&content).map_err(|e| {
            format!(
                "Configuration file is corrupted: {e}\nRun 'ragindex init --force' to regenerate."
            )
        })?;
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, Self::default_toml_template())?;
        Ok(config_path)
    }

    /// Index root resolved against the workspace root when relative
    #[must_use]
    pub fn resolved_index_path(&self) -> PathBuf {
        self.resolve_path(&self.index_path)
    }

    /// Corpus source resolved against the workspace root when relative
    #[must_use]
    pub fn resolved_corpus_source(&self) -> PathBuf {
        self.resolve_path(&self.corpus.source)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn default_toml_template() -> String {
        let defaults = Settings::default();
        format!(
            r#"# ragindex configuration
# Every value can be overridden with RAGINDEX_<SECTION>__<KEY> environment variables.

version = {version}

# Root directory of the generation store
index_path = "{index_path}"

# Verbose logging (RUST_LOG takes precedence)
debug = false

[embedding]
# fastembed model name, or "hash-v1" for the deterministic offline embedder
model = "{model}"
batch_size = {batch_size}
hash_dimension = {hash_dimension}
show_download_progress = true

[corpus]
# "documents" (directory of text files) or "pull_requests" (JSON / JSON Lines)
kind = "documents"
source = "{source}"

[corpus.placeholders]
issue = "{issue}"
comments = "{comments}"
diff = "{diff}"

[retrieval]
top_k = {top_k}

[generation]
endpoint = "{endpoint}"
model = "{completion_model}"
temperature = {temperature}
max_tokens = {max_tokens}
timeout_secs = {timeout_secs}

[build]
# Published generations kept on disk for rollback, including the current one
retain_generations = {retain}
"#,
            version = defaults.version,
            index_path = defaults.index_path.display(),
            model = defaults.embedding.model,
            batch_size = defaults.embedding.batch_size,
            hash_dimension = defaults.embedding.hash_dimension,
            source = defaults.corpus.source.display(),
            issue = defaults.corpus.placeholders.issue,
            comments = defaults.corpus.placeholders.comments,
            diff = defaults.corpus.placeholders.diff,
            top_k = defaults.retrieval.top_k,
            endpoint = defaults.generation.endpoint,
            completion_model = defaults.generation.model,
            temperature = defaults.generation.temperature,
            max_tokens = defaults.generation.max_tokens,
            timeout_secs = defaults.generation.timeout_secs,
            retain = defaults.build.retain_generations,
        )
    }
}
