//! Error types for newsdesk.
//!
//! The taxonomy mirrors how failures are handled by the pipeline:
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`ExtractError`] | format handlers | converted to an `extractionFailed` status, never propagated |
//! | [`EmbedError`] | embedders | surfaced as a failed upsert, candidate retried next pass |
//! | [`StoreError`] | vector stores | surfaced as a failed upsert, candidate retried next pass |
//! | [`RecordError`] | system of record | aborts the pass that hit it |
//! | [`Error::Config`] | initialization | fatal, the indexing subsystem refuses to start |

use thiserror::Error;

/// Main error type for newsdesk operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// System of record operation failed
    #[error("record store error: {0}")]
    Records(#[from] RecordError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration fault, fatal at initialization
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error must stop the indexing subsystem from starting.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Store(StoreError::ManifestMismatch { .. })
                | Error::Embedding(EmbedError::DimensionMismatch { .. })
        )
    }
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dependency unavailable")]
    DependencyUnavailable,

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("empty input text")]
    EmptyInput,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("store not initialized")]
    NotInitialized,

    #[error("index manifest mismatch: stored {stored}, configured {configured}")]
    ManifestMismatch { stored: String, configured: String },
}

/// System of record errors.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: i64 },
}

/// Result type alias for newsdesk operations.
pub type Result<T> = std::result::Result<T, Error>;
