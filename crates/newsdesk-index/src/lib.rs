//! Semantic indexing for newsdesk.
//!
//! This crate keeps the vector index consistent with the system of record:
//! candidates → embedding → vector store → mark indexed.
//!
//! # Components
//!
//! - [`VectorIndex`]: upsert, delete, search, reset and bulk reindex over a [`VectorStore`](newsdesk_core::VectorStore)
//! - [`CandidateSelector`]: unindexed entities with text, newest first, capped per kind
//! - [`IndexingOrchestrator`]: runs indexing passes and full rebuilds
//! - [`IndexUpdate`]: events emitted during a pass
//!
//! # Example
//!
//! ```rust,ignore
//! use newsdesk_index::{CandidateSelector, IndexingOrchestrator, OrchestratorConfig, VectorIndex};
//!
//! let index = Arc::new(VectorIndex::open(store, embedder, VectorIndexConfig::default()).await?);
//! let orchestrator = IndexingOrchestrator::new(
//!     CandidateSelector::new(Arc::clone(&records)),
//!     records,
//!     index,
//!     OrchestratorConfig::default(),
//! );
//!
//! let report = orchestrator.run_indexing_pass().await?;
//! if report.is_partial() {
//!     for failure in report.failures() {
//!         eprintln!("{}: {:?}", failure.id, failure.error);
//!     }
//! }
//! ```

pub mod orchestrator;
pub mod selector;
pub mod vector_index;

pub use orchestrator::{IndexUpdate, IndexingOrchestrator, OrchestratorConfig};
pub use selector::{CandidateSelector, DEFAULT_LIMIT_PER_KIND};
pub use vector_index::{VectorIndex, VectorIndexConfig, DEFAULT_PREVIEW_CHARS};
