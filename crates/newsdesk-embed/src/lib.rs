//! # newsdesk-embed
//!
//! Text embedding for the newsdesk indexing pipeline.
//!
//! Every encoder implements [`newsdesk_core::Embedder`], and so do the two
//! wrappers, so they stack:
//!
//! ```text
//! EmbedderPool ─→ EmbeddingCache ─→ CandleEmbedder | HashingEmbedder
//! ```
//!
//! ## Cargo Features
//!
//! - `candle`: BERT sentence encoder on the Candle ML stack. Weights come
//!   from the Hugging Face hub on first use.
//! - Without `candle`: [`HashingEmbedder`] and [`NoopEmbedder`] only.
//!
//! ## Default Model
//!
//! | Property | Value |
//! |----------|-------|
//! | Model | `sentence-transformers/all-MiniLM-L6-v2` |
//! | Dimension | 384 |
//! | Max tokens | 512 |
//! | Pooling | mean, L2 normalised |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use newsdesk_embed::{CandleEmbedder, EmbedderPool, EmbeddingCache};
//! use newsdesk_core::EmbeddingConfig;
//! use std::sync::Arc;
//!
//! let encoder = Arc::new(CandleEmbedder::new(models_dir));
//! encoder.init().await?;
//!
//! let cached = Arc::new(EmbeddingCache::new(encoder));
//! let pool = EmbedderPool::new(cached, 4);
//!
//! let vector = pool.encode("Oil prices fell", &EmbeddingConfig::default()).await?;
//! ```
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CandleEmbedder`] | BERT sentence embeddings (requires `candle` feature) |
//! | [`HashingEmbedder`] | Deterministic feature hashing (always available) |
//! | [`NoopEmbedder`] | Zero vectors (always available) |
//! | [`EmbeddingCache`] | Memoises outputs by content hash |
//! | [`EmbedderPool`] | Semaphore-bounded concurrent inference |

#[cfg(feature = "candle")]
pub mod candle;

#[cfg(feature = "candle")]
pub use candle::CandleEmbedder;

pub mod cache;
pub mod hash;
pub mod noop;
pub mod pool;

pub use cache::{CacheStats, EmbeddingCache};
pub use hash::HashingEmbedder;
pub use noop::NoopEmbedder;
pub use pool::EmbedderPool;
