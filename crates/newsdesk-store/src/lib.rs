//! Vector storage backends for newsdesk.
//!
//! Both backends implement [`VectorStore`](newsdesk_core::VectorStore) and
//! persist an [`IndexManifest`](newsdesk_core::IndexManifest) alongside their
//! data, refusing to open under a different model identity.
//!
//! | Backend | Feature | Persistence | Search |
//! |---------|---------|-------------|--------|
//! | [`MemoryStore`] | always | optional JSON snapshot + journal | brute force |
//! | [`LanceStore`] | `lancedb` | LanceDB table | LanceDB vector query |
//!
//! # Example
//!
//! ```rust,ignore
//! use newsdesk_store::MemoryStore;
//! use newsdesk_core::{DistanceMetric, IndexManifest, VectorStore};
//!
//! let store = MemoryStore::persistent("/var/lib/newsdesk/vectors");
//! store.init(&IndexManifest::new("sentence-transformers/all-MiniLM-L6-v2", 384, DistanceMetric::Cosine)).await?;
//!
//! store.upsert(record).await?;
//! let hits = store.search(&query_vector, 10, None).await?;
//! ```

#[cfg(feature = "lancedb")]
pub mod lancedb;
pub mod manifest;
pub mod memory;
#[cfg(feature = "lancedb")]
pub mod schema;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceStore;
pub use memory::MemoryStore;
