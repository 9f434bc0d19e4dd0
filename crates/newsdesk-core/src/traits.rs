//! Core traits for newsdesk components.
//!
//! - [`Embedder`]: Map text to fixed-length vectors
//! - [`VectorStore`]: Persist vector records and search them
//! - [`RecordStore`]: The relational system of record for articles and uploads
//!
//! Services are constructed once at process start and shared as `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::error::{EmbedError, RecordError, StoreError};
use crate::types::{
    EmbeddingConfig, EmbeddingOutput, EntityKind, IndexManifest, IndexableEntity,
    MetadataFilter, NewArticle, NewUpload, RecordStats, SearchHit, StoreStats, VectorRecord,
};

// ============================================================================
// Embedding
// ============================================================================

/// Trait for generating embeddings.
///
/// Implementations must be deterministic for a fixed model and safe to call
/// concurrently.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum tokens per input. Longer input is truncated.
    fn max_tokens(&self) -> usize;

    /// Embed text content.
    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError>;

    /// Embed a query.
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let results = self.embed_text(&[query], config).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Trait for vector storage and search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open the store for the given model identity.
    ///
    /// Fails with [`StoreError::ManifestMismatch`] when existing records were
    /// produced under a different manifest.
    async fn init(&self, manifest: &IndexManifest) -> Result<(), StoreError>;

    /// Replace any record with the same id by this one.
    async fn upsert(&self, record: VectorRecord) -> Result<(), StoreError>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError>;

    /// Nearest records to `embedding`, ascending by distance.
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError>;

    /// Drop every record, keeping the manifest.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Compact writes made since the last flush.
    ///
    /// Records are durable once `upsert` returns; flushing only reorganizes
    /// storage. Backends that write through keep the default.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Get store statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

// ============================================================================
// System of Record
// ============================================================================

/// The relational store that owns articles and uploads.
///
/// It is authoritative for the `indexed` flag.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unindexed entities with non-empty text, newest first, at most `limit`.
    async fn list_unindexed(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<IndexableEntity>, RecordError>;

    /// Every entity with non-empty text, regardless of its flag.
    async fn list_indexable(&self, kind: EntityKind) -> Result<Vec<IndexableEntity>, RecordError>;

    /// Set the indexed flag and timestamp.
    async fn mark_indexed(&self, id: i64, kind: EntityKind) -> Result<(), RecordError>;

    /// Clear every indexed flag of a kind. Returns the number of rows changed.
    async fn clear_indexed(&self, kind: EntityKind) -> Result<u64, RecordError>;

    /// Insert or update an article keyed by URL. Returns its id.
    async fn save_article(&self, article: &NewArticle) -> Result<i64, RecordError>;

    /// Insert an uploaded document. Returns its id.
    async fn save_upload(&self, upload: &NewUpload) -> Result<i64, RecordError>;

    /// Row counts.
    async fn stats(&self) -> Result<RecordStats, RecordError>;
}
