//! # newsdesk-core
//!
//! Core types and traits for the newsdesk document ingestion and semantic
//! indexing pipeline.
//!
//! ## Architecture
//!
//! ```text
//! upload ─→ extractor ─→ RecordStore ─→ selector ─→ orchestrator
//!                                                        │
//!                                    Embedder ─→ VectorStore ─→ search
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ExtractedDocument`] | Normalized text, sections and metadata of one file |
//! | [`IndexableEntity`] | An article or upload that can be embedded |
//! | [`VectorRecord`] | Embedding + preview + metadata, keyed by id |
//! | [`SearchHit`] | A ranked result with distance and similarity |
//! | [`PassReport`] | `{attempted, succeeded}` of one indexing pass |
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Embedder`] | Generate vector embeddings |
//! | [`VectorStore`] | Store and search vector records |
//! | [`RecordStore`] | Read candidates from and mark them in the system of record |

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EmbedError, Error, ExtractError, RecordError, Result, StoreError};
pub use traits::{Embedder, RecordStore, VectorStore};
pub use types::*;
