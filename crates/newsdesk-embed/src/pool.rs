//! Bounded-concurrency access to an embedder.
//!
//! Indexing fans out across entities; the pool keeps at most
//! `max_concurrent` inference calls in flight so the model backend is not
//! oversubscribed.

use std::sync::Arc;

use async_trait::async_trait;
use newsdesk_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};
use tokio::sync::Semaphore;

/// Embedder wrapper with a concurrency limit.
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    semaphore: Semaphore,
    max_concurrent: usize,
}

impl EmbedderPool {
    pub fn new(embedder: Arc<dyn Embedder>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    /// Get the wrapped embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Embed a single document text.
    ///
    /// Blank text is rejected with [`EmbedError::EmptyInput`] before any
    /// inference, and the output length is checked against the declared
    /// dimension.
    pub async fn encode(&self, text: &str, config: &EmbeddingConfig) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let output = self
            .embed_text(&[text], config)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("empty embedding result".to_string()))?;

        if output.embedding.len() != self.dimension() {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension(),
                actual: output.embedding.len(),
            });
        }
        Ok(output.embedding)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[async_trait]
impl Embedder for EmbedderPool {
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
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

        self.embedder.embed_text(texts, config).await
    }

    async fn embed_query(
        &self,
        query: &str,
        config: &EmbeddingConfig,
    ) -> Result<EmbeddingOutput, EmbedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| EmbedError::Inference(format!("semaphore error: {e}")))?;

        self.embedder.embed_query(query, config).await
    }
}
