//! Deterministic feature-hashing embedder.
//!
//! Each lowercased word is hashed with blake3; the first eight bytes pick a
//! bucket and a sign. The bucket counts form the vector, which is then L2
//! normalised. Texts sharing words land close together under cosine
//! distance, which is enough for tests and for builds without a neural
//! model.

use async_trait::async_trait;
use newsdesk_core::{EmbedError, Embedder, EmbeddingConfig, EmbeddingOutput};

/// Maximum words considered per input.
const MAX_TOKENS: usize = 8192;

/// Feature-hashing embedder. Always available.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimension`-long vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("hashing-{dimension}"),
        }
    }

    fn embed_one(&self, text: &str, normalize: bool) -> Result<EmbeddingOutput, EmbedError> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut token_count = 0;

        for word in tokens(text).take(MAX_TOKENS) {
            let hash = blake3::hash(word.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let value = u64::from_le_bytes(bytes);

            let bucket = (value % self.dimension as u64) as usize;
            let sign = if value >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            token_count += 1;
        }

        if token_count == 0 {
            return Err(EmbedError::EmptyInput);
        }

        if normalize {
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                vector.iter_mut().for_each(|x| *x /= norm);
            }
        }

        Ok(EmbeddingOutput {
            embedding: vector,
            token_count,
        })
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

/// Lowercased alphanumeric words.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        MAX_TOKENS
    }

    async fn embed_text(
        &self,
        texts: &[&str],
        config: &EmbeddingConfig,
    ) -> Result<Vec<EmbeddingOutput>, EmbedError> {
        texts
            .iter()
            .map(|text| self.embed_one(text, config.normalize))
            .collect()
    }
}
