//! In-process system of record.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_core::{
    EntityDescriptor, EntityKind, IndexableEntity, NewArticle, NewUpload, RecordError,
    RecordStats, RecordStore,
};
use tokio::sync::RwLock;

use crate::article_text;

#[derive(Debug, Clone)]
struct ArticleRow {
    article: NewArticle,
    vector_indexed: bool,
    last_indexed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct UploadRow {
    upload: NewUpload,
    upload_date: DateTime<Utc>,
    vector_indexed: bool,
    last_indexed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    next_article_id: i64,
    next_upload_id: i64,
    articles: BTreeMap<i64, ArticleRow>,
    uploads: BTreeMap<i64, UploadRow>,
}

impl Tables {
    fn article_entity(id: i64, row: &ArticleRow) -> Option<IndexableEntity> {
        let a = &row.article;
        let text = article_text(a.full_content.as_deref(), a.content.as_deref())?;
        Some(IndexableEntity {
            id,
            kind: EntityKind::Article,
            text: text.to_string(),
            descriptor: EntityDescriptor {
                title: a.title.clone(),
                source: a.source.clone(),
                url: Some(a.url.clone()),
                date: a.published_date.or(Some(a.scraped_date)),
            },
            indexed: row.vector_indexed,
        })
    }

    fn upload_entity(id: i64, row: &UploadRow) -> Option<IndexableEntity> {
        let u = &row.upload;
        if u.extracted_text.trim().is_empty() {
            return None;
        }
        Some(IndexableEntity {
            id,
            kind: EntityKind::Upload,
            text: u.extracted_text.clone(),
            descriptor: EntityDescriptor {
                title: u.filename.clone(),
                source: u.file_type.as_str().to_string(),
                url: u.file_path.clone(),
                date: Some(row.upload_date),
            },
            indexed: row.vector_indexed,
        })
    }

    /// Indexable entities of a kind, newest first.
    fn entities(&self, kind: EntityKind) -> Vec<IndexableEntity> {
        match kind {
            EntityKind::Article => self
                .articles
                .iter()
                .rev()
                .filter_map(|(id, row)| Self::article_entity(*id, row))
                .collect(),
            EntityKind::Upload => self
                .uploads
                .iter()
                .rev()
                .filter_map(|(id, row)| Self::upload_entity(*id, row))
                .collect(),
        }
    }
}

/// Articles and uploads held in process memory.
///
/// Ids are assigned from per-table sequences starting at 1, like the SQLite
/// store, so vector ids line up across both backends.
#[derive(Default)]
pub struct MemoryRecords {
    tables: RwLock<Tables>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the entity was last marked indexed.
    pub async fn last_indexed_at(&self, id: i64, kind: EntityKind) -> Option<DateTime<Utc>> {
        let tables = self.tables.read().await;
        match kind {
            EntityKind::Article => tables.articles.get(&id)?.last_indexed_at,
            EntityKind::Upload => tables.uploads.get(&id)?.last_indexed_at,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn list_unindexed(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<IndexableEntity>, RecordError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entities(kind)
            .into_iter()
            .filter(|e| !e.indexed)
            .take(limit)
            .collect())
    }

    async fn list_indexable(&self, kind: EntityKind) -> Result<Vec<IndexableEntity>, RecordError> {
        Ok(self.tables.read().await.entities(kind))
    }

    async fn mark_indexed(&self, id: i64, kind: EntityKind) -> Result<(), RecordError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let flags = match kind {
            EntityKind::Article => tables
                .articles
                .get_mut(&id)
                .map(|r| (&mut r.vector_indexed, &mut r.last_indexed_at)),
            EntityKind::Upload => tables
                .uploads
                .get_mut(&id)
                .map(|r| (&mut r.vector_indexed, &mut r.last_indexed_at)),
        };
        let (indexed, at) = flags.ok_or_else(|| RecordError::NotFound {
            kind: kind.to_string(),
            id,
        })?;
        *indexed = true;
        *at = Some(now);
        Ok(())
    }

    async fn clear_indexed(&self, kind: EntityKind) -> Result<u64, RecordError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        match kind {
            EntityKind::Article => {
                for row in tables.articles.values_mut().filter(|r| r.vector_indexed) {
                    row.vector_indexed = false;
                    row.last_indexed_at = None;
                    changed += 1;
                }
            }
            EntityKind::Upload => {
                for row in tables.uploads.values_mut().filter(|r| r.vector_indexed) {
                    row.vector_indexed = false;
                    row.last_indexed_at = None;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn save_article(&self, article: &NewArticle) -> Result<i64, RecordError> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .articles
            .iter_mut()
            .find(|(_, row)| row.article.url == article.url);
        if let Some((id, row)) = existing {
            let unchanged = row.article.content == article.content
                && row.article.full_content == article.full_content;
            // Title, source and dates keep their first-seen values.
            row.article.summary.clone_from(&article.summary);
            row.article.content.clone_from(&article.content);
            row.article.full_content.clone_from(&article.full_content);
            if !unchanged {
                row.vector_indexed = false;
            }
            return Ok(*id);
        }

        tables.next_article_id += 1;
        let id = tables.next_article_id;
        tables.articles.insert(
            id,
            ArticleRow {
                article: article.clone(),
                vector_indexed: false,
                last_indexed_at: None,
            },
        );
        Ok(id)
    }

    async fn save_upload(&self, upload: &NewUpload) -> Result<i64, RecordError> {
        let mut tables = self.tables.write().await;
        tables.next_upload_id += 1;
        let id = tables.next_upload_id;
        tables.uploads.insert(
            id,
            UploadRow {
                upload: upload.clone(),
                upload_date: Utc::now(),
                vector_indexed: false,
                last_indexed_at: None,
            },
        );
        Ok(id)
    }

    async fn stats(&self) -> Result<RecordStats, RecordError> {
        let tables = self.tables.read().await;
        Ok(RecordStats {
            articles: tables.articles.len() as u64,
            uploads: tables.uploads.len() as u64,
            unindexed_articles: tables.articles.values().filter(|r| !r.vector_indexed).count()
                as u64,
            unindexed_uploads: tables.uploads.values().filter(|r| !r.vector_indexed).count()
                as u64,
        })
    }
}
