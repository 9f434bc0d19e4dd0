//! SQLite system of record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_core::{
    EntityDescriptor, EntityKind, IndexableEntity, NewArticle, NewUpload, RecordError,
    RecordStats, RecordStore,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::{article_text, word_count};

/// `TRIM` characters matching `char::is_whitespace`, so the SQL filter and
/// `str::trim` agree on what counts as empty text.
const WS: &str = "char(9, 10, 11, 12, 13, 32, 133, 160, 5760, \
    8192, 8193, 8194, 8195, 8196, 8197, 8198, 8199, 8200, 8201, 8202, \
    8232, 8233, 8239, 8287, 12288)";

fn query_error(e: sqlx::Error) -> RecordError {
    RecordError::Query(e.to_string())
}

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Article => "articles",
        EntityKind::Upload => "uploaded_documents",
    }
}

/// SQL predicate selecting rows that have text to embed.
fn has_text(kind: EntityKind) -> String {
    match kind {
        EntityKind::Article => format!(
            "(TRIM(COALESCE(full_content, ''), {WS}) <> '' OR TRIM(COALESCE(content, ''), {WS}) <> '')"
        ),
        EntityKind::Upload => format!("TRIM(COALESCE(extracted_text, ''), {WS}) <> ''"),
    }
}

fn select_columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Article => {
            "id, title, source, url, full_content, content, published_date, scraped_date, vector_indexed"
        }
        EntityKind::Upload => {
            "id, filename, file_type, file_path, extracted_text, upload_date, vector_indexed"
        }
    }
}

fn row_to_entity(kind: EntityKind, row: &SqliteRow) -> Result<Option<IndexableEntity>, RecordError> {
    let id: i64 = row.try_get("id").map_err(query_error)?;
    let indexed: bool = row.try_get("vector_indexed").map_err(query_error)?;

    let (text, descriptor) = match kind {
        EntityKind::Article => {
            let full_content: Option<String> = row.try_get("full_content").map_err(query_error)?;
            let content: Option<String> = row.try_get("content").map_err(query_error)?;
            let Some(text) = article_text(full_content.as_deref(), content.as_deref()) else {
                return Ok(None);
            };
            let published: Option<DateTime<Utc>> =
                row.try_get("published_date").map_err(query_error)?;
            let scraped: Option<DateTime<Utc>> = row.try_get("scraped_date").map_err(query_error)?;
            (
                text.to_string(),
                EntityDescriptor {
                    title: row.try_get("title").map_err(query_error)?,
                    source: row.try_get("source").map_err(query_error)?,
                    url: row.try_get("url").map_err(query_error)?,
                    date: published.or(scraped),
                },
            )
        }
        EntityKind::Upload => {
            let text: Option<String> = row.try_get("extracted_text").map_err(query_error)?;
            let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
                return Ok(None);
            };
            (
                text,
                EntityDescriptor {
                    title: row.try_get("filename").map_err(query_error)?,
                    source: row.try_get("file_type").map_err(query_error)?,
                    url: row.try_get("file_path").map_err(query_error)?,
                    date: row.try_get("upload_date").map_err(query_error)?,
                },
            )
        }
    };

    Ok(Some(IndexableEntity {
        id,
        kind,
        text,
        descriptor,
        indexed,
    }))
}

/// Articles and uploads in a SQLite database.
#[derive(Clone)]
pub struct SqliteRecords {
    pool: SqlitePool,
}

impl SqliteRecords {
    /// Connect to `database_url` and create the tables if needed.
    ///
    /// `sqlite::memory:` gives a private in-memory database.
    pub async fn connect(database_url: &str) -> Result<Self, RecordError> {
        info!("Connecting to database: {}", database_url);
        let in_memory = database_url.contains(":memory:");

        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            // Every connection would otherwise get its own empty database.
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| RecordError::Connection(e.to_string()))?;

        let records = Self { pool };
        records.migrate().await?;
        Ok(records)
    }

    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes.
    pub async fn migrate(&self) -> Result<(), RecordError> {
        debug!("Running database migrations...");
        let migration_error = |e: sqlx::Error| RecordError::Migration(e.to_string());

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                source TEXT NOT NULL,
                summary TEXT,
                content TEXT,
                full_content TEXT,
                published_date TEXT,
                scraped_date TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                word_count INTEGER NOT NULL DEFAULT 0,
                vector_indexed INTEGER NOT NULL DEFAULT 0,
                last_indexed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(migration_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploaded_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_path TEXT,
                file_size INTEGER NOT NULL DEFAULT 0,
                extracted_text TEXT,
                structured_data TEXT,
                word_count INTEGER NOT NULL DEFAULT 0,
                page_count INTEGER,
                upload_date TEXT NOT NULL,
                vector_indexed INTEGER NOT NULL DEFAULT 0,
                last_indexed_at TEXT,
                metadata TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(migration_error)?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS articles_vector_indexed_idx ON articles(vector_indexed)",
            "CREATE INDEX IF NOT EXISTS documents_vector_indexed_idx ON uploaded_documents(vector_indexed)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(migration_error)?;
        }

        debug!("Migrations complete");
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<u64, RecordError> {
        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl RecordStore for SqliteRecords {
    async fn list_unindexed(
        &self,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<IndexableEntity>, RecordError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE vector_indexed = 0 AND {} ORDER BY id DESC LIMIT ?",
            select_columns(kind),
            table(kind),
            has_text(kind)
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entity) = row_to_entity(kind, row)? {
                entities.push(entity);
            }
        }
        debug!("{} unindexed {} candidates", entities.len(), kind);
        Ok(entities)
    }

    async fn list_indexable(&self, kind: EntityKind) -> Result<Vec<IndexableEntity>, RecordError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id DESC",
            select_columns(kind),
            table(kind),
            has_text(kind)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entity) = row_to_entity(kind, row)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn mark_indexed(&self, id: i64, kind: EntityKind) -> Result<(), RecordError> {
        let sql = format!(
            "UPDATE {} SET vector_indexed = 1, last_indexed_at = ? WHERE id = ?",
            table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound {
                kind: kind.to_string(),
                id,
            });
        }
        Ok(())
    }

    async fn clear_indexed(&self, kind: EntityKind) -> Result<u64, RecordError> {
        let sql = format!(
            "UPDATE {} SET vector_indexed = 0, last_indexed_at = NULL WHERE vector_indexed = 1",
            table(kind)
        );
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected())
    }

    async fn save_article(&self, article: &NewArticle) -> Result<i64, RecordError> {
        let words = article_text(article.full_content.as_deref(), article.content.as_deref())
            .map_or(0, word_count);

        // A changed body clears the indexed flag so the next pass re-embeds it.
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles
                (title, url, source, summary, content, full_content,
                 published_date, scraped_date, word_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (url) DO UPDATE SET
                summary = excluded.summary,
                content = excluded.content,
                full_content = excluded.full_content,
                word_count = excluded.word_count,
                vector_indexed = CASE
                    WHEN articles.content IS excluded.content
                     AND articles.full_content IS excluded.full_content
                    THEN articles.vector_indexed
                    ELSE 0
                END
            RETURNING id
            "#,
        )
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.source)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.full_content)
        .bind(article.published_date)
        .bind(article.scraped_date)
        .bind(i64::try_from(words).unwrap_or(i64::MAX))
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        debug!("Saved article {} ({})", id, article.url);
        Ok(id)
    }

    async fn save_upload(&self, upload: &NewUpload) -> Result<i64, RecordError> {
        let structured = serde_json::to_string(&upload.structured_data)
            .map_err(|e| RecordError::Query(format!("structured data: {e}")))?;
        let metadata = serde_json::to_string(&upload.metadata)
            .map_err(|e| RecordError::Query(format!("metadata: {e}")))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO uploaded_documents
                (filename, file_type, file_path, file_size, extracted_text,
                 structured_data, word_count, page_count, upload_date, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&upload.filename)
        .bind(upload.file_type.as_str())
        .bind(&upload.file_path)
        .bind(i64::try_from(upload.file_size).unwrap_or(i64::MAX))
        .bind(&upload.extracted_text)
        .bind(structured)
        .bind(i64::try_from(upload.word_count).unwrap_or(i64::MAX))
        .bind(upload.page_count.map(i64::from))
        .bind(Utc::now())
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        debug!("Saved upload {} ({})", id, upload.filename);
        Ok(id)
    }

    async fn stats(&self) -> Result<RecordStats, RecordError> {
        Ok(RecordStats {
            articles: self.count("SELECT COUNT(*) FROM articles").await?,
            uploads: self.count("SELECT COUNT(*) FROM uploaded_documents").await?,
            unindexed_articles: self
                .count("SELECT COUNT(*) FROM articles WHERE vector_indexed = 0")
                .await?,
            unindexed_uploads: self
                .count("SELECT COUNT(*) FROM uploaded_documents WHERE vector_indexed = 0")
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use newsdesk_core::SourceFormat;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    async fn records() -> SqliteRecords {
        SqliteRecords::connect("sqlite::memory:").await.unwrap()
    }

    fn article(n: u32, full_content: Option<&str>, content: Option<&str>) -> NewArticle {
        NewArticle {
            title: format!("Story {n}"),
            url: format!("https://news.example.com/{n}"),
            source: "Example Wire".to_string(),
            summary: None,
            content: content.map(String::from),
            full_content: full_content.map(String::from),
            published_date: Some(Utc.with_ymd_and_hms(2024, 3, n, 9, 0, 0).unwrap()),
            scraped_date: Utc::now(),
        }
    }

    fn upload(name: &str, text: &str) -> NewUpload {
        NewUpload {
            filename: name.to_string(),
            file_type: SourceFormat::Text,
            file_path: Some(format!("/uploads/{name}")),
            file_size: text.len() as u64,
            extracted_text: text.to_string(),
            structured_data: Vec::new(),
            word_count: word_count(text),
            page_count: None,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_unindexed_selection_skips_empty_text() {
        let records = records().await;
        records.save_article(&article(1, Some("Full body"), None)).await.unwrap();
        records.save_article(&article(2, None, Some("Short body"))).await.unwrap();
        records.save_article(&article(3, Some(" \n"), Some(""))).await.unwrap();
        records.save_upload(&upload("notes.txt", "Meeting notes")).await.unwrap();
        records.save_upload(&upload("scan.pdf", "")).await.unwrap();

        let articles = records.list_unindexed(EntityKind::Article, 100).await.unwrap();
        let titles: Vec<_> = articles.iter().map(|a| a.descriptor.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 2", "Story 1"]);
        assert_eq!(articles[0].text, "Short body");
        assert_eq!(articles[1].text, "Full body");
        assert_eq!(
            articles[1].descriptor.date,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
        );

        let uploads = records.list_unindexed(EntityKind::Upload, 100).await.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].descriptor.source, "text");
        assert_eq!(uploads[0].descriptor.url.as_deref(), Some("/uploads/notes.txt"));
        assert!(uploads[0].descriptor.date.is_some());
    }

    #[tokio::test]
    async fn test_unicode_whitespace_counts_as_empty() {
        let records = records().await;
        records
            .save_article(&article(1, Some("\u{00A0}\u{2003}"), Some("\u{3000}")))
            .await
            .unwrap();
        records
            .save_article(&article(2, Some("\u{00A0}"), Some("Wire copy")))
            .await
            .unwrap();
        records
            .save_upload(&upload("blank.txt", "\u{00A0}\u{2003}\u{0B}\u{0C}"))
            .await
            .unwrap();

        let articles = records.list_unindexed(EntityKind::Article, 1).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].descriptor.title, "Story 2");
        assert_eq!(articles[0].text, "Wire copy");

        let all = records.list_indexable(EntityKind::Article).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(records
            .list_unindexed(EntityKind::Upload, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_limit_keeps_newest() {
        let records = records().await;
        for n in 1..=5 {
            records
                .save_article(&article(n, Some("body"), None))
                .await
                .unwrap();
        }
        let newest = records.list_unindexed(EntityKind::Article, 2).await.unwrap();
        let titles: Vec<_> = newest.iter().map(|a| a.descriptor.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 5", "Story 4"]);
    }

    #[tokio::test]
    async fn test_mark_and_clear_indexed() {
        let records = records().await;
        let id = records.save_article(&article(1, Some("body"), None)).await.unwrap();

        records.mark_indexed(id, EntityKind::Article).await.unwrap();
        assert!(records.list_unindexed(EntityKind::Article, 10).await.unwrap().is_empty());
        let all = records.list_indexable(EntityKind::Article).await.unwrap();
        assert!(all[0].indexed);

        let stats = records.stats().await.unwrap();
        assert_eq!(stats.articles, 1);
        assert_eq!(stats.unindexed_articles, 0);

        assert_eq!(records.clear_indexed(EntityKind::Article).await.unwrap(), 1);
        assert_eq!(records.list_unindexed(EntityKind::Article, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_missing_row() {
        let records = records().await;
        let err = records.mark_indexed(42, EntityKind::Upload).await.unwrap_err();
        assert_eq!(err.to_string(), "upload 42 not found");
    }

    #[tokio::test]
    async fn test_article_upsert_by_url() {
        let records = records().await;
        let id = records.save_article(&article(1, Some("v1"), None)).await.unwrap();
        records.mark_indexed(id, EntityKind::Article).await.unwrap();

        // Same content keeps the flag.
        let same = records.save_article(&article(1, Some("v1"), None)).await.unwrap();
        assert_eq!(same, id);
        assert!(records.list_unindexed(EntityKind::Article, 10).await.unwrap().is_empty());

        // Changed content clears it.
        let changed = records.save_article(&article(1, Some("v2"), None)).await.unwrap();
        assert_eq!(changed, id);
        let pending = records.list_unindexed(EntityKind::Article, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "v2");
        assert_eq!(records.stats().await.unwrap().articles, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("news.db").display());
        {
            let records = SqliteRecords::connect(&url).await.unwrap();
            records.save_upload(&upload("a.txt", "alpha")).await.unwrap();
            records.pool().close().await;
        }
        let records = SqliteRecords::connect(&url).await.unwrap();
        assert_eq!(records.stats().await.unwrap().uploads, 1);
    }
}
