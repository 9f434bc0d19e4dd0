//! Indexing passes.
//!
//! A pass pulls candidates from the [`CandidateSelector`], upserts each one
//! into the [`VectorIndex`] and only then marks it indexed in the system of
//! record. That mark is the commit point: an entity whose upsert or mark
//! fails stays unindexed and is picked up again by the next pass. Upserts
//! are idempotent per id, so a crash between the two writes costs one
//! duplicate embedding and nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use newsdesk_core::{
    EntityKind, IndexOutcome, IndexableEntity, KindSelector, PassReport, RecordStore, Result,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::selector::CandidateSelector;
use crate::vector_index::VectorIndex;

/// Progress events emitted while indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    PassStarted { candidates: usize },
    EntityIndexed { id: String },
    EntityFailed { id: String, error: String },
    PassFinished { attempted: usize, succeeded: usize },
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Entities processed concurrently within a pass
    pub workers: usize,
    /// Kinds a pass covers
    pub kinds: KindSelector,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            kinds: KindSelector::All,
        }
    }
}

/// Drives candidates from the system of record into the vector index.
pub struct IndexingOrchestrator {
    selector: CandidateSelector,
    records: Arc<dyn RecordStore>,
    index: Arc<VectorIndex>,
    config: OrchestratorConfig,
    update_tx: broadcast::Sender<IndexUpdate>,
}

impl IndexingOrchestrator {
    pub fn new(
        selector: CandidateSelector,
        records: Arc<dyn RecordStore>,
        index: Arc<VectorIndex>,
        config: OrchestratorConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            selector,
            records,
            index,
            config,
            update_tx,
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Run one indexing pass over the current candidates.
    ///
    /// Per-entity failures are reported in the [`PassReport`]; only a
    /// failure to read candidates returns `Err`.
    pub async fn run_indexing_pass(&self) -> Result<PassReport> {
        let candidates = self.selector.list_unindexed(self.config.kinds).await?;
        info!("Indexing pass over {} candidates", candidates.len());
        let _ = self.update_tx.send(IndexUpdate::PassStarted {
            candidates: candidates.len(),
        });

        let outcomes: Vec<IndexOutcome> = stream::iter(candidates)
            .map(|entity| async move { self.index_entity(&entity).await })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;
        self.index.flush().await;

        Ok(self.finish(outcomes))
    }

    /// Upsert one entity, then commit it in the system of record.
    async fn index_entity(&self, entity: &IndexableEntity) -> IndexOutcome {
        let outcome = self.index.upsert(&entity.to_index_document()).await;
        let outcome = if outcome.success {
            self.commit(entity.id, entity.kind, outcome).await
        } else {
            outcome
        };
        self.announce(&outcome);
        outcome
    }

    async fn commit(&self, id: i64, kind: EntityKind, outcome: IndexOutcome) -> IndexOutcome {
        match self.records.mark_indexed(id, kind).await {
            Ok(()) => outcome,
            Err(e) => {
                warn!(id = %outcome.id, "Indexed but not marked: {}", e);
                IndexOutcome::failed(outcome.id, format!("mark indexed failed: {e}"))
            }
        }
    }

    fn announce(&self, outcome: &IndexOutcome) {
        let update = match &outcome.error {
            None => IndexUpdate::EntityIndexed {
                id: outcome.id.clone(),
            },
            Some(error) => IndexUpdate::EntityFailed {
                id: outcome.id.clone(),
                error: error.clone(),
            },
        };
        let _ = self.update_tx.send(update);
    }

    fn finish(&self, outcomes: Vec<IndexOutcome>) -> PassReport {
        let report = PassReport::from_outcomes(outcomes);
        if report.is_partial() {
            warn!(
                "Indexing pass: {}/{} succeeded",
                report.succeeded, report.attempted
            );
        } else {
            info!(
                "Indexing pass: {}/{} succeeded",
                report.succeeded, report.attempted
            );
        }
        let _ = self.update_tx.send(IndexUpdate::PassFinished {
            attempted: report.attempted,
            succeeded: report.succeeded,
        });
        report
    }

    /// Drop the whole index and rebuild it from every entity with text.
    ///
    /// Indexed flags are cleared first, so an interrupted rebuild leaves the
    /// remaining entities as ordinary candidates for later passes.
    pub async fn rebuild(&self) -> Result<PassReport> {
        info!("Rebuilding vector index");
        self.index.reset().await?;
        for &kind in self.config.kinds.kinds() {
            let cleared = self.records.clear_indexed(kind).await?;
            debug!("Cleared {} indexed {} flags", cleared, kind);
        }

        let entities = self.selector.list_indexable(self.config.kinds).await?;
        let _ = self.update_tx.send(IndexUpdate::PassStarted {
            candidates: entities.len(),
        });
        let by_id: HashMap<String, &IndexableEntity> =
            entities.iter().map(|e| (e.document_id(), e)).collect();
        let documents = entities.iter().map(IndexableEntity::to_index_document).collect();

        let mut outcomes = Vec::with_capacity(entities.len());
        for outcome in self.index.reindex_outcomes(documents).await {
            let outcome = match by_id.get(&outcome.id) {
                Some(entity) if outcome.success => {
                    self.commit(entity.id, entity.kind, outcome).await
                }
                _ => outcome,
            };
            self.announce(&outcome);
            outcomes.push(outcome);
        }

        Ok(self.finish(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::VectorIndexConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use newsdesk_core::{
        NewArticle, NewUpload, RecordError, RecordStats, SourceFormat, VectorStore,
    };
    use newsdesk_embed::{EmbedderPool, HashingEmbedder};
    use newsdesk_records::MemoryRecords;
    use newsdesk_store::MemoryStore;
    use std::collections::BTreeMap;

    fn article(n: usize, body: &str) -> NewArticle {
        NewArticle {
            title: format!("Story {n}"),
            url: format!("https://example.com/{n}"),
            source: "Wire".to_string(),
            summary: Some("summary".to_string()),
            content: Some(body.to_string()),
            full_content: None,
            published_date: Some(Utc::now()),
            scraped_date: Utc::now(),
        }
    }

    fn upload(name: &str, text: &str) -> NewUpload {
        NewUpload {
            filename: name.to_string(),
            file_type: SourceFormat::Text,
            file_path: Some(format!("uploads/{name}")),
            file_size: text.len() as u64,
            extracted_text: text.to_string(),
            structured_data: Vec::new(),
            word_count: text.split_whitespace().count(),
            page_count: None,
            metadata: BTreeMap::new(),
        }
    }

    async fn open_index(store: Arc<dyn VectorStore>) -> Arc<VectorIndex> {
        let pool = Arc::new(EmbedderPool::new(Arc::new(HashingEmbedder::new(64)), 2));
        Arc::new(
            VectorIndex::open(store, pool, VectorIndexConfig::default())
                .await
                .unwrap(),
        )
    }

    async fn orchestrator(records: Arc<dyn RecordStore>) -> IndexingOrchestrator {
        let index = open_index(Arc::new(MemoryStore::new())).await;
        IndexingOrchestrator::new(
            CandidateSelector::new(Arc::clone(&records)),
            records,
            index,
            OrchestratorConfig::default(),
        )
    }

    async fn seed(records: &MemoryRecords) {
        for n in 1..=3 {
            records
                .save_article(&article(n, &format!("article body number {n}")))
                .await
                .unwrap();
        }
        records.save_upload(&upload("a.txt", "quarterly figures")).await.unwrap();
        records.save_upload(&upload("b.txt", "board minutes")).await.unwrap();
    }

    #[tokio::test]
    async fn test_pass_indexes_and_marks_everything() {
        let records = Arc::new(MemoryRecords::new());
        seed(&records).await;
        let orchestrator = orchestrator(Arc::clone(&records) as Arc<dyn RecordStore>).await;

        let report = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(orchestrator.index().count().await.unwrap(), 5);

        let stats = records.stats().await.unwrap();
        assert_eq!(stats.unindexed_articles, 0);
        assert_eq!(stats.unindexed_uploads, 0);

        let record = orchestrator.index().get("upload-2").await.unwrap().unwrap();
        assert_eq!(record.metadata.title, "b.txt");
        assert_eq!(record.metadata.doc_type, "upload");
        assert_eq!(record.metadata.source, "text");
    }

    #[tokio::test]
    async fn test_second_pass_has_nothing_to_do() {
        let records = Arc::new(MemoryRecords::new());
        seed(&records).await;
        let orchestrator = orchestrator(Arc::clone(&records) as Arc<dyn RecordStore>).await;

        orchestrator.run_indexing_pass().await.unwrap();
        let report = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert!(!report.is_partial());
    }

    #[tokio::test]
    async fn test_updated_article_is_reindexed_in_place() {
        let records = Arc::new(MemoryRecords::new());
        seed(&records).await;
        let orchestrator = orchestrator(Arc::clone(&records) as Arc<dyn RecordStore>).await;
        orchestrator.run_indexing_pass().await.unwrap();

        records
            .save_article(&article(2, "a correction was issued"))
            .await
            .unwrap();
        let report = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.outcomes[0].id, "article-2");
        assert_eq!(orchestrator.index().count().await.unwrap(), 5);

        let record = orchestrator.index().get("article-2").await.unwrap().unwrap();
        assert_eq!(record.preview, "a correction was issued");
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let records = Arc::new(MemoryRecords::new());
        records.save_upload(&upload("a.txt", "alpha")).await.unwrap();
        let orchestrator = orchestrator(records).await;
        let mut updates = orchestrator.subscribe();

        orchestrator.run_indexing_pass().await.unwrap();

        assert_eq!(
            updates.recv().await.unwrap(),
            IndexUpdate::PassStarted { candidates: 1 }
        );
        assert_eq!(
            updates.recv().await.unwrap(),
            IndexUpdate::EntityIndexed {
                id: "upload-1".to_string()
            }
        );
        assert_eq!(
            updates.recv().await.unwrap(),
            IndexUpdate::PassFinished {
                attempted: 1,
                succeeded: 1
            }
        );
    }

    /// Record store whose `mark_indexed` always fails.
    struct UnmarkableRecords {
        inner: MemoryRecords,
    }

    #[async_trait]
    impl RecordStore for UnmarkableRecords {
        async fn list_unindexed(
            &self,
            kind: EntityKind,
            limit: usize,
        ) -> std::result::Result<Vec<IndexableEntity>, RecordError> {
            self.inner.list_unindexed(kind, limit).await
        }

        async fn list_indexable(
            &self,
            kind: EntityKind,
        ) -> std::result::Result<Vec<IndexableEntity>, RecordError> {
            self.inner.list_indexable(kind).await
        }

        async fn mark_indexed(
            &self,
            _id: i64,
            _kind: EntityKind,
        ) -> std::result::Result<(), RecordError> {
            Err(RecordError::Query("database is locked".to_string()))
        }

        async fn clear_indexed(&self, kind: EntityKind) -> std::result::Result<u64, RecordError> {
            self.inner.clear_indexed(kind).await
        }

        async fn save_article(
            &self,
            article: &NewArticle,
        ) -> std::result::Result<i64, RecordError> {
            self.inner.save_article(article).await
        }

        async fn save_upload(&self, upload: &NewUpload) -> std::result::Result<i64, RecordError> {
            self.inner.save_upload(upload).await
        }

        async fn stats(&self) -> std::result::Result<RecordStats, RecordError> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_failed_mark_counts_as_failure_and_retries() {
        let inner = MemoryRecords::new();
        inner.save_upload(&upload("a.txt", "alpha")).await.unwrap();
        let records: Arc<dyn RecordStore> = Arc::new(UnmarkableRecords { inner });
        let orchestrator = orchestrator(records).await;

        let report = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 0);
        assert!(report.outcomes[0]
            .error
            .as_deref()
            .unwrap()
            .contains("mark indexed failed"));

        // The vector is written; the next pass rewrites it under the same id.
        let again = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(again.attempted, 1);
        assert_eq!(orchestrator.index().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_stale_records() {
        let records = Arc::new(MemoryRecords::new());
        seed(&records).await;
        let orchestrator = orchestrator(Arc::clone(&records) as Arc<dyn RecordStore>).await;
        orchestrator.run_indexing_pass().await.unwrap();

        // A record with no backing entity disappears on rebuild.
        let stray = newsdesk_core::IndexDocument {
            id: "article-99".to_string(),
            text: "orphan".to_string(),
            metadata: Default::default(),
        };
        assert!(orchestrator.index().upsert(&stray).await.success);
        assert_eq!(orchestrator.index().count().await.unwrap(), 6);

        let report = orchestrator.rebuild().await.unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.succeeded, 5);
        assert_eq!(orchestrator.index().count().await.unwrap(), 5);
        assert!(orchestrator.index().get("article-99").await.unwrap().is_none());
        assert_eq!(records.stats().await.unwrap().unindexed_articles, 0);
    }

    #[tokio::test]
    async fn test_blank_candidates_never_reach_the_index() {
        let records = Arc::new(MemoryRecords::new());
        records.save_upload(&upload("scan.pdf", "")).await.unwrap();
        records.save_upload(&upload("ok.txt", "text")).await.unwrap();
        let orchestrator = orchestrator(Arc::clone(&records) as Arc<dyn RecordStore>).await;

        let report = orchestrator.run_indexing_pass().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(records.stats().await.unwrap().unindexed_uploads, 1);
    }
}
