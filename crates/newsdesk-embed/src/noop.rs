//! Zero-vector embedder.
//!
//! Useful for exercising storage and orchestration plumbing where the
//! embedding values do not matter. Every vector is all zeros, so cosine
//! distances are meaningless.

use async_trait::async_trait;
use newsdesk_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Embedder that returns zero vectors.
///
/// # Example
///
/// ```rust
/// use newsdesk_embed::NoopEmbedder;
/// use newsdesk_core::{Embedder, EmbeddingConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = NoopEmbedder::with_dimension(8);
/// let outputs = embedder
///     .embed_text(&["Hello", "World"], &EmbeddingConfig::default())
///     .await?;
///
/// assert_eq!(outputs.len(), 2);
/// assert!(outputs[0].embedding.iter().all(|&v| v == 0.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    /// 384-dimensional zero vectors.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(384)
    }

    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for NoopEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    fn model_name(&self) -> &str {
        "noop"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        512
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        _config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        Ok(texts
            .iter()
            .map(|_| EmbeddingOutput {
                embedding: vec![0.0; self.dimension],
                token_count: 0,
            })
            .collect())
    }
}
