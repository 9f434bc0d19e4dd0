//! Indexing candidate selection.

use std::sync::Arc;

use newsdesk_core::{IndexableEntity, KindSelector, RecordError, RecordStore};
use tracing::debug;

/// Candidates taken per kind in one pass.
pub const DEFAULT_LIMIT_PER_KIND: usize = 100;

/// Picks the entities an indexing pass should embed.
///
/// A candidate is unindexed and has non-blank text. Within each kind the
/// newest rows come first, capped at `limit_per_kind` so one pass stays
/// bounded however large the backlog is.
#[derive(Clone)]
pub struct CandidateSelector {
    records: Arc<dyn RecordStore>,
    limit_per_kind: usize,
}

impl CandidateSelector {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self::with_limit(records, DEFAULT_LIMIT_PER_KIND)
    }

    pub fn with_limit(records: Arc<dyn RecordStore>, limit_per_kind: usize) -> Self {
        Self {
            records,
            limit_per_kind,
        }
    }

    pub fn limit_per_kind(&self) -> usize {
        self.limit_per_kind
    }

    /// Unindexed candidates: articles first, then uploads.
    pub async fn list_unindexed(
        &self,
        kinds: KindSelector,
    ) -> Result<Vec<IndexableEntity>, RecordError> {
        let mut candidates = Vec::new();
        for &kind in kinds.kinds() {
            let batch = self.records.list_unindexed(kind, self.limit_per_kind).await?;
            debug!("{} {} candidates", batch.len(), kind);
            candidates.extend(batch.into_iter().filter(has_text));
        }
        Ok(candidates)
    }

    /// Every entity with text, indexed or not. Used by full rebuilds.
    pub async fn list_indexable(
        &self,
        kinds: KindSelector,
    ) -> Result<Vec<IndexableEntity>, RecordError> {
        let mut entities = Vec::new();
        for &kind in kinds.kinds() {
            let batch = self.records.list_indexable(kind).await?;
            entities.extend(batch.into_iter().filter(has_text));
        }
        Ok(entities)
    }
}

fn has_text(entity: &IndexableEntity) -> bool {
    !entity.text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use newsdesk_core::{EntityKind, NewArticle, NewUpload, SourceFormat};
    use newsdesk_records::MemoryRecords;
    use std::collections::BTreeMap;

    fn article(n: usize, body: &str) -> NewArticle {
        NewArticle {
            title: format!("Story {n}"),
            url: format!("https://example.com/{n}"),
            source: "Wire".to_string(),
            summary: None,
            content: Some(body.to_string()),
            full_content: None,
            published_date: None,
            scraped_date: Utc::now(),
        }
    }

    fn upload(text: &str) -> NewUpload {
        NewUpload {
            filename: "scan.pdf".to_string(),
            file_type: SourceFormat::Pdf,
            file_path: None,
            file_size: 1,
            extracted_text: text.to_string(),
            structured_data: Vec::new(),
            word_count: 0,
            page_count: Some(1),
            metadata: BTreeMap::new(),
        }
    }

    async fn seeded() -> Arc<MemoryRecords> {
        let records = Arc::new(MemoryRecords::new());
        for n in 1..=5 {
            records.save_article(&article(n, "body")).await.unwrap();
        }
        records.save_upload(&upload("page text")).await.unwrap();
        records.save_upload(&upload("")).await.unwrap();
        records
    }

    #[tokio::test]
    async fn test_cap_applies_per_kind() {
        let records = seeded().await;
        let selector = CandidateSelector::with_limit(records, 3);

        let all = selector.list_unindexed(KindSelector::All).await.unwrap();
        let articles: Vec<i64> = all
            .iter()
            .filter(|e| e.kind == EntityKind::Article)
            .map(|e| e.id)
            .collect();
        assert_eq!(articles, vec![5, 4, 3]);
        assert_eq!(all.iter().filter(|e| e.kind == EntityKind::Upload).count(), 1);
    }

    #[tokio::test]
    async fn test_single_kind() {
        let records = seeded().await;
        let selector = CandidateSelector::new(records);
        let uploads = selector.list_unindexed(KindSelector::Upload).await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].text, "page text");
    }

    #[tokio::test]
    async fn test_indexed_entities_are_excluded() {
        let records = seeded().await;
        records.mark_indexed(5, EntityKind::Article).await.unwrap();
        let selector = CandidateSelector::new(Arc::clone(&records) as Arc<dyn RecordStore>);

        let articles = selector.list_unindexed(KindSelector::Article).await.unwrap();
        assert_eq!(articles.len(), 4);
        assert!(articles.iter().all(|a| a.id != 5));

        let indexable = selector.list_indexable(KindSelector::Article).await.unwrap();
        assert_eq!(indexable.len(), 5);
    }
}
