//! Configuration handling for newsdesk.
//!
//! The file is TOML, found at `<config_dir>/config.toml` unless `--config`
//! names another one. Every field has a default, so an empty or missing
//! file is a valid configuration. Paths left unset resolve under the data
//! directory at use time.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use newsdesk_core::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Indexing pass configuration
    #[serde(default)]
    pub index: IndexSettings,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store with a JSON snapshot
    #[default]
    Snapshot,
    /// LanceDB table (feature `lancedb`)
    Lancedb,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// System of record, e.g. `sqlite:/path/newsdesk.db?mode=rwc`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Directory holding the vector index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_path: Option<PathBuf>,

    #[serde(default)]
    pub backend: StoreBackend,
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedBackend {
    /// BERT sentence encoder (feature `candle`)
    Candle,
    /// Feature hashing, no model download
    Hashing,
}

impl Default for EmbedBackend {
    fn default() -> Self {
        if cfg!(feature = "candle") {
            EmbedBackend::Candle
        } else {
            EmbedBackend::Hashing
        }
    }
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub backend: EmbedBackend,

    /// Model to use with the candle backend
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max concurrent embedding jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Cached embeddings kept in memory
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrent() -> usize {
    4
}

fn default_cache_size() -> usize {
    10_000
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbedBackend::default(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            cache_size: default_cache_size(),
        }
    }
}

/// Indexing-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Candidates per kind in one pass
    #[serde(default = "default_limit_per_kind")]
    pub limit_per_kind: usize,

    /// Characters kept as the record preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Entities processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_limit_per_kind() -> usize {
    100
}

fn default_preview_chars() -> usize {
    2000
}

fn default_workers() -> usize {
    4
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            limit_per_kind: default_limit_per_kind(),
            preview_chars: default_preview_chars(),
            workers: default_workers(),
            metric: DistanceMetric::default(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default result limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum result limit
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

const SAMPLE_CONFIG: &str = r#"# newsdesk configuration

[storage]
# database_url = "sqlite:/home/me/.local/share/newsdesk/newsdesk.db?mode=rwc"
# vector_path = "/home/me/.local/share/newsdesk/vectors"
backend = "snapshot"        # snapshot | lancedb

[embedding]
# backend = "candle"        # candle | hashing
model = "sentence-transformers/all-MiniLM-L6-v2"
dimension = 384
batch_size = 32
max_concurrent = 4
cache_size = 10000

[index]
limit_per_kind = 100
preview_chars = 2000
workers = 4
metric = "cosine"           # cosine | l2 | dot

[query]
default_limit = 10
max_limit = 100

[logging]
level = "info"
# file = "/tmp/newsdesk.log"
"#;

impl Config {
    /// Load from the default location, or defaults when no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, falling back to the default location.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env_overrides())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// `DATABASE_URL` wins over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.storage.database_url = Some(url);
            }
        }
        self
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn sample_toml() -> &'static str {
        SAMPLE_CONFIG
    }

    /// Effective system-of-record URL.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.storage.database_url {
            return Ok(url.clone());
        }
        let dir = data_dir().context("Failed to get data directory")?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        Ok(format!("sqlite:{}?mode=rwc", dir.join("newsdesk.db").display()))
    }

    /// Effective vector index directory.
    pub fn vector_path(&self) -> Result<PathBuf> {
        match &self.storage.vector_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()
                .context("Failed to get data directory")?
                .join("vectors")),
        }
    }

    /// Where downloaded models are cached.
    pub fn model_cache_dir(&self) -> Result<PathBuf> {
        cache_dir()
            .map(|dir| dir.join("models"))
            .context("Failed to get cache directory")
    }
}

/// Get the XDG data directory for newsdesk.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("NEWSDESK_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "newsdesk").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for newsdesk.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("NEWSDESK_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "newsdesk").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the XDG cache directory for newsdesk.
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "newsdesk").map(|dirs| dirs.cache_dir().to_path_buf())
}
