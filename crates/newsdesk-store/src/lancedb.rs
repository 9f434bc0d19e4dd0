//! `LanceDB` implementation of `VectorStore`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use newsdesk_core::{
    DistanceMetric, DocumentMetadata, IndexManifest, MetadataFilter, SearchHit, StoreError,
    StoreStats, VectorRecord, VectorStore,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::manifest::{check_manifest, read_manifest, write_manifest};
use crate::schema::{documents_schema, DOCUMENTS_TABLE, VECTOR_COLUMN};

/// LanceDB-backed vector store.
pub struct LanceStore {
    db_path: PathBuf,
    table: RwLock<Option<(Table, IndexManifest)>>,
}

impl LanceStore {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            table: RwLock::new(None),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn opened(&self) -> Result<(Table, IndexManifest), StoreError> {
        self.table
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    async fn collect(
        stream: impl futures::Stream<Item = lancedb::Result<RecordBatch>>,
    ) -> Result<Vec<RecordBatch>, StoreError> {
        stream
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn init(&self, manifest: &IndexManifest) -> Result<(), StoreError> {
        let mut slot = self.table.write().await;
        if let Some((_, current)) = slot.as_ref() {
            return check_manifest(Some(current), manifest);
        }

        info!("Initializing LanceDB at {:?}", self.db_path);
        tokio::fs::create_dir_all(&self.db_path)
            .await
            .map_err(|e| StoreError::Init(format!("Failed to create db directory: {e}")))?;

        let stored = read_manifest(&self.db_path).await?;
        check_manifest(stored.as_ref(), manifest)?;

        let conn = connect(&self.db_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to connect to LanceDB: {e}")))?;

        let tables = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to list tables: {e}")))?;

        if !tables.iter().any(|t| t == DOCUMENTS_TABLE) {
            info!("Creating {} table", DOCUMENTS_TABLE);
            conn.create_empty_table(DOCUMENTS_TABLE, Arc::new(documents_schema(manifest.dimension)))
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("Failed to create table: {e}")))?;
        }

        let table = conn
            .open_table(DOCUMENTS_TABLE)
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("Failed to open table: {e}")))?;

        if stored.is_none() {
            write_manifest(&self.db_path, manifest).await?;
        }

        *slot = Some((table, manifest.clone()));
        info!("LanceDB initialized ({})", manifest);
        Ok(())
    }

    async fn upsert(&self, record: VectorRecord) -> Result<(), StoreError> {
        let (table, manifest) = self.opened().await?;
        if record.embedding.len() != manifest.dimension {
            return Err(StoreError::Insert(format!(
                "embedding has {} dimensions, index expects {}",
                record.embedding.len(),
                manifest.dimension
            )));
        }

        table
            .delete(&id_predicate(&record.id))
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to replace {}: {e}", record.id)))?;

        let batch = records_to_batch(std::slice::from_ref(&record), manifest.dimension)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("Failed to insert {}: {e}", record.id)))?;

        debug!("Upserted {}", record.id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let (table, _) = self.opened().await?;
        let existed = table
            .count_rows(Some(id_predicate(id)))
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))?
            > 0;
        if existed {
            table
                .delete(&id_predicate(id))
                .await
                .map_err(|e| StoreError::Delete(format!("Failed to delete {id}: {e}")))?;
        }
        Ok(existed)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let (table, _) = self.opened().await?;
        let stream = table
            .query()
            .only_if(id_predicate(id))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query {id}: {e}")))?;

        for batch in Self::collect(stream).await? {
            if let Some((record, _)) = batch_to_records(&batch)?.into_iter().next() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let (table, manifest) = self.opened().await?;
        if embedding.len() != manifest.dimension {
            return Err(StoreError::Query(format!(
                "query has {} dimensions, index expects {}",
                embedding.len(),
                manifest.dimension
            )));
        }
        if limit == 0 || filter.is_some_and(|f| !f.is_satisfiable()) {
            return Ok(Vec::new());
        }
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut query = table
            .query()
            .nearest_to(embedding)
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .column(VECTOR_COLUMN)
            .distance_type(distance_type(manifest.metric))
            .limit(limit);
        if let Some(predicate) = filter.and_then(filter_predicate) {
            query = query.only_if(predicate);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        for batch in Self::collect(stream).await? {
            for (record, distance) in batch_to_records(&batch)? {
                let distance = match (manifest.metric, distance) {
                    // Lance reports squared euclidean distance
                    (DistanceMetric::L2, Some(d)) => d.max(0.0).sqrt(),
                    (_, Some(d)) => d,
                    (metric, None) => metric.distance(embedding, &record.embedding),
                };
                hits.push(SearchHit::new(record, distance));
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        debug!("Found {} results", hits.len());
        Ok(hits)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let (table, _) = self.opened().await?;
        table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| StoreError::Delete(format!("Failed to reset table: {e}")))?;
        info!("Reset LanceDB table {}", DOCUMENTS_TABLE);
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let (table, _) = self.opened().await?;
        table
            .count_rows(None)
            .await
            .map(|n| n as u64)
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_records = self.count().await?;
        let manifest = self.table.read().await.as_ref().map(|(_, m)| m.clone());
        Ok(StoreStats {
            total_records,
            index_size_bytes: calculate_dir_size(&self.db_path),
            last_updated: Some(Utc::now()),
            manifest,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn id_predicate(id: &str) -> String {
    format!("id = {}", quote(id))
}

/// SQL conjunction for a filter, or `None` when it has no conditions.
///
/// Keys are limited to the known metadata columns, so they are safe to
/// splice in unquoted.
fn filter_predicate(filter: &MetadataFilter) -> Option<String> {
    let clauses: Vec<String> = filter
        .iter()
        .filter(|(key, _)| DocumentMetadata::FILTER_KEYS.contains(key))
        .map(|(key, value)| format!("{key} = {}", quote(value)))
        .collect();
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// Calculate the total size of a directory recursively.
fn calculate_dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                calculate_dir_size(&entry_path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

fn records_to_batch(records: &[VectorRecord], dimension: usize) -> Result<RecordBatch, StoreError> {
    fn strings<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
        Arc::new(StringArray::from_iter_values(values))
    }

    let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), dimension as i32);
    for record in records {
        vectors.values().append_slice(&record.embedding);
        vectors.append(true);
    }

    let indexed_at: StringArray = records
        .iter()
        .map(|r| r.metadata.indexed_at.map(|t| t.to_rfc3339()))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        strings(records.iter().map(|r| r.id.as_str())),
        Arc::new(vectors.finish()),
        strings(records.iter().map(|r| r.preview.as_str())),
        strings(records.iter().map(|r| r.metadata.title.as_str())),
        strings(records.iter().map(|r| r.metadata.source.as_str())),
        strings(records.iter().map(|r| r.metadata.url.as_str())),
        strings(records.iter().map(|r| r.metadata.date.as_str())),
        strings(records.iter().map(|r| r.metadata.doc_type.as_str())),
        Arc::new(indexed_at),
    ];

    RecordBatch::try_new(Arc::new(documents_schema(dimension)), columns)
        .map_err(|e| StoreError::Insert(format!("Failed to create RecordBatch: {e}")))
}

/// Records of a batch, with `_distance` when the batch came from a vector query.
fn batch_to_records(batch: &RecordBatch) -> Result<Vec<(VectorRecord, Option<f32>)>, StoreError> {
    let string_column = |name: &str| -> Result<&StringArray, StoreError> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| StoreError::Schema(format!("missing column {name}")))
    };

    let ids = string_column("id")?;
    let previews = string_column("preview")?;
    let titles = string_column("title")?;
    let sources = string_column("source")?;
    let urls = string_column("url")?;
    let dates = string_column("date")?;
    let doc_types = string_column("doc_type")?;
    let indexed_at = string_column("indexed_at")?;
    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| StoreError::Schema(format!("missing column {VECTOR_COLUMN}")))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let values = vectors.value(i);
        let embedding = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| StoreError::Schema("vector items are not f32".to_string()))?
            .values()
            .to_vec();

        let indexed_at = if indexed_at.is_null(i) {
            None
        } else {
            DateTime::parse_from_rfc3339(indexed_at.value(i))
                .ok()
                .map(|t| t.with_timezone(&Utc))
        };

        let record = VectorRecord {
            id: ids.value(i).to_string(),
            embedding,
            preview: previews.value(i).to_string(),
            metadata: DocumentMetadata {
                title: titles.value(i).to_string(),
                source: sources.value(i).to_string(),
                url: urls.value(i).to_string(),
                date: dates.value(i).to_string(),
                doc_type: doc_types.value(i).to_string(),
                indexed_at,
            },
        };
        records.push((record, distances.map(|d| d.value(i))));
    }
    Ok(records)
}
