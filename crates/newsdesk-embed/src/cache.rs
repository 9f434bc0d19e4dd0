//! Embedding cache keyed by content hash.
//!
//! Re-indexing an unchanged article embeds the same text again; the cache
//! turns that into a lookup. Keys are the blake3 hash of the exact text and
//! the output-shaping options of [`EmbeddingConfig`]. The model is not part
//! of the key, which is why a cache wraps exactly one [`Embedder`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key for `text` embedded under `config`.
fn cache_key(text: &str, config: &EmbeddingConfig) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[u8::from(config.normalize)]);
    hasher.update(text.as_bytes());
    hasher.finalize()
}

/// Default maximum number of cached embeddings.
pub const DEFAULT_CACHE_SIZE: usize = 10_000;

#[derive(Clone)]
struct CacheEntry {
    output: EmbeddingOutput,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<blake3::Hash, CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop the least recently used tenth once the cache is full.
    fn evict_if_full(&mut self, max_size: usize) {
        if self.entries.len() < max_size {
            return;
        }
        let evict_count = (max_size / 10).max(1);
        let mut by_age: Vec<(blake3::Hash, u64)> = self
            .entries
            .iter()
            .map(|(k, v)| (*k, v.last_access))
            .collect();
        by_age.sort_by_key(|(_, access)| *access);
        for (key, _) in by_age.into_iter().take(evict_count) {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Memoising wrapper around an [`Embedder`].
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    state: RwLock<CacheState>,
    max_size: usize,
}

impl EmbeddingCache {
    /// Create a cache holding up to [`DEFAULT_CACHE_SIZE`] embeddings.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_capacity(embedder, DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(embedder: Arc<dyn Embedder>, max_size: usize) -> Self {
        Self {
            embedder,
            state: RwLock::new(CacheState::default()),
            max_size: max_size.max(1),
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.read().await.stats
    }

    /// Number of cached embeddings.
    pub async fn size(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn clear(&self) {
        self.state.write().await.entries.clear();
    }
}

#[async_trait]
impl Embedder for EmbeddingCache {
    fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn max_tokens(&self) -> usize {
        self.embedder.max_tokens()
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        let keys: Vec<blake3::Hash> = texts.iter().map(|t| cache_key(t, config)).collect();
        let mut results: Vec<Option<EmbeddingOutput>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();

        {
            let mut state = self.state.write().await;
            for (i, key) in keys.iter().enumerate() {
                let access = state.tick();
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.last_access = access;
                    results[i] = Some(entry.output.clone());
                    state.stats.hits += 1;
                } else {
                    missing.push(i);
                    state.stats.misses += 1;
                }
            }
        }

        if !missing.is_empty() {
            debug!("Cache miss for {} of {} texts", missing.len(), texts.len());
            let batch: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let fresh = self.embedder.embed_text(&batch, config).await?;
            if fresh.len() != batch.len() {
                return Err(EmbedError::Inference(format!(
                    "embedder returned {} outputs for {} inputs",
                    fresh.len(),
                    batch.len()
                )));
            }

            let mut state = self.state.write().await;
            for (&i, output) in missing.iter().zip(fresh) {
                state.evict_if_full(self.max_size);
                let last_access = state.tick();
                state.entries.insert(
                    keys[i],
                    CacheEntry {
                        output: output.clone(),
                        last_access,
                    },
                );
                results[i] = Some(output);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| EmbedError::Inference("missing cached output".to_string())))
            .collect()
    }

    /// Queries are one-off and bypass the cache.
    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        self.embedder.embed_query(query, config).await
    }
}
