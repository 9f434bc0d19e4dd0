//! Vector index service.
//!
//! Wraps a [`VectorStore`] backend with the embedder that feeds it. Writes
//! and searches never return `Err`: every failure is reported as a
//! structured [`IndexOutcome`] or [`SearchOutcome`] so batch callers can
//! carry on past a bad item. Only [`VectorIndex::open`] fails hard, because
//! a store built for another model would return meaningless distances.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use newsdesk_core::{
    DistanceMetric, Embedder, EmbeddingConfig, Error, IndexDocument, IndexManifest, IndexOutcome,
    MetadataFilter, Result, SearchOutcome, StoreError, StoreStats, VectorRecord, VectorStore,
};
use newsdesk_embed::EmbedderPool;
use tracing::{debug, info, warn};

/// Characters of text kept as the record preview.
pub const DEFAULT_PREVIEW_CHARS: usize = 2000;

/// Configuration for the vector index.
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Preview length in characters
    pub preview_chars: usize,
    /// Distance metric recorded in the manifest
    pub metric: DistanceMetric,
    /// Concurrent upserts during [`VectorIndex::reindex_all`]
    pub workers: usize,
    pub embed_config: EmbeddingConfig,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
            metric: DistanceMetric::Cosine,
            workers: 4,
            embed_config: EmbeddingConfig::default(),
        }
    }
}

/// Persistent id → (embedding, preview, metadata) map with similarity search.
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<EmbedderPool>,
    manifest: IndexManifest,
    config: VectorIndexConfig,
}

impl VectorIndex {
    /// Open the index for the embedder's model.
    ///
    /// Any initialisation failure, including a manifest written by another
    /// model, is a configuration fault.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embedder: Arc<EmbedderPool>,
        config: VectorIndexConfig,
    ) -> Result<Self> {
        let manifest = IndexManifest::new(embedder.model_name(), embedder.dimension(), config.metric);
        info!("Opening vector index ({})", manifest);

        store.init(&manifest).await.map_err(|e| match e {
            StoreError::ManifestMismatch { .. } => Error::Config(format!(
                "{e}; run `newsdesk rebuild --force` after changing the embedding model"
            )),
            other => Error::Config(format!("cannot open vector store: {other}")),
        })?;

        Ok(Self {
            store,
            embedder,
            manifest,
            config,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Embed `document` and replace any record with the same id.
    pub async fn upsert(&self, document: &IndexDocument) -> IndexOutcome {
        match self.try_upsert(document).await {
            Ok(()) => {
                debug!(id = %document.id, "Upserted");
                IndexOutcome::ok(&document.id)
            }
            Err(e) => {
                warn!(id = %document.id, "Upsert failed: {}", e);
                IndexOutcome::failed(&document.id, e)
            }
        }
    }

    async fn try_upsert(&self, document: &IndexDocument) -> Result<()> {
        let embedding = self
            .embedder
            .encode(&document.text, &self.config.embed_config)
            .await?;

        let mut metadata = document.metadata.clone();
        metadata.indexed_at = Some(Utc::now());

        self.store
            .upsert(VectorRecord {
                id: document.id.clone(),
                embedding,
                preview: preview(&document.text, self.config.preview_chars),
                metadata,
            })
            .await?;
        Ok(())
    }

    /// Remove a record. An absent id is a success.
    pub async fn delete(&self, id: &str) -> IndexOutcome {
        match self.store.delete(id).await {
            Ok(existed) => {
                debug!(id, existed, "Deleted");
                IndexOutcome::ok(id)
            }
            Err(e) => {
                warn!(id, "Delete failed: {}", e);
                IndexOutcome::failed(id, e)
            }
        }
    }

    /// Up to `top_k` records nearest to `query`, ascending by distance.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> SearchOutcome {
        if top_k == 0 {
            return SearchOutcome::ok(Vec::new());
        }
        let embedding = match self.embedder.encode(query, &self.config.embed_config).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Query embedding failed: {}", e);
                return SearchOutcome::failed(Error::Embedding(e));
            }
        };
        let filter = filter.filter(|f| !f.is_empty());

        match self.store.search(&embedding, top_k, filter).await {
            Ok(hits) => {
                debug!("Search returned {} hits", hits.len());
                SearchOutcome::ok(hits)
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                SearchOutcome::failed(Error::Store(e))
            }
        }
    }

    /// Fetch the stored record for `id`.
    pub async fn get(&self, id: &str) -> std::result::Result<Option<VectorRecord>, StoreError> {
        self.store.get(id).await
    }

    /// Upsert every document; returns how many succeeded.
    pub async fn reindex_all(&self, documents: Vec<IndexDocument>) -> usize {
        self.reindex_outcomes(documents)
            .await
            .iter()
            .filter(|o| o.success)
            .count()
    }

    /// Upsert every document and return each outcome.
    ///
    /// Upserts run concurrently, bounded by `workers`. Outcomes are in
    /// completion order.
    pub async fn reindex_outcomes(&self, documents: Vec<IndexDocument>) -> Vec<IndexOutcome> {
        let total = documents.len();
        let outcomes: Vec<IndexOutcome> = stream::iter(documents)
            .map(|document| async move { self.upsert(&document).await })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        info!("Reindexed {}/{} documents", succeeded, total);
        self.flush().await;
        outcomes
    }

    /// Compact the store after a batch of writes.
    ///
    /// Every successful upsert is already durable, so a failure here is
    /// logged and leaves the records in place.
    pub async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            warn!("Vector store flush failed: {}", e);
        }
    }

    /// Drop every record. The manifest is kept.
    pub async fn reset(&self) -> std::result::Result<(), StoreError> {
        info!("Resetting vector index");
        self.store.reset().await
    }

    pub async fn count(&self) -> std::result::Result<u64, StoreError> {
        self.store.count().await
    }

    pub async fn stats(&self) -> std::result::Result<StoreStats, StoreError> {
        self.store.stats().await
    }
}

/// First `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
