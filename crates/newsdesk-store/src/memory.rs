//! In-memory vector store with optional on-disk persistence.
//!
//! Search is brute force over every record, which is fine for a personal
//! dashboard's few thousand articles. With a snapshot directory, every
//! mutation is appended to a JSON-lines journal before it is applied in
//! memory. [`VectorStore::flush`] and reopening fold the journal into a
//! full snapshot (temp file + rename), so a bulk reindex costs one append
//! per record rather than one full rewrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_core::{
    IndexManifest, MetadataFilter, SearchHit, StoreError, StoreStats, VectorRecord, VectorStore,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::manifest::{check_manifest, read_manifest, write_atomic, write_manifest};

pub const SNAPSHOT_FILE: &str = "records.json";
pub const JOURNAL_FILE: &str = "journal.jsonl";

#[derive(Default)]
struct State {
    manifest: Option<IndexManifest>,
    records: HashMap<String, VectorRecord>,
    last_updated: Option<DateTime<Utc>>,
    /// Journal lines not yet folded into the snapshot
    pending: usize,
}

impl State {
    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Upsert { at, record } => {
                self.records.insert(record.id.clone(), record);
                self.last_updated = Some(at);
            }
            JournalEntry::Delete { at, id } => {
                self.records.remove(&id);
                self.last_updated = Some(at);
            }
            JournalEntry::Reset { at } => {
                self.records.clear();
                self.last_updated = Some(at);
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    last_updated: Option<DateTime<Utc>>,
    records: Vec<VectorRecord>,
}

/// One journaled mutation.
#[derive(Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Upsert {
        at: DateTime<Utc>,
        record: VectorRecord,
    },
    Delete {
        at: DateTime<Utc>,
        id: String,
    },
    Reset {
        at: DateTime<Utc>,
    },
}

/// Brute-force vector store.
///
/// # Example
///
/// ```rust
/// use newsdesk_store::MemoryStore;
/// use newsdesk_core::{DistanceMetric, IndexManifest, VectorStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.init(&IndexManifest::new("hashing-8", 8, DistanceMetric::Cosine)).await?;
/// assert_eq!(store.count().await?, 0);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    snapshot_dir: Option<PathBuf>,
    state: RwLock<State>,
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot_dir: None,
            state: RwLock::new(State::default()),
        }
    }

    /// A store persisted under `dir`.
    #[must_use]
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: Some(dir.into()),
            state: RwLock::new(State::default()),
        }
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot_dir.as_deref()
    }

    async fn load_snapshot(dir: &Path) -> Result<Option<Snapshot>, StoreError> {
        let path = dir.join(SNAPSHOT_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Schema(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Init(format!("{}: {e}", path.display()))),
        }
    }

    /// Read journal entries in write order.
    ///
    /// A torn final line (crash mid-append) is dropped; a bad line anywhere
    /// else is a schema error.
    async fn load_journal(dir: &Path) -> Result<Vec<JournalEntry>, StoreError> {
        let path = dir.join(JOURNAL_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Init(format!("{}: {e}", path.display()))),
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut entries = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if i + 1 == lines.len() => {
                    warn!("Dropping torn journal line in {}: {}", path.display(), e);
                }
                Err(e) => {
                    return Err(StoreError::Schema(format!(
                        "{} line {}: {e}",
                        path.display(),
                        i + 1
                    )))
                }
            }
        }
        Ok(entries)
    }

    /// Append one mutation to the journal. Called with the write lock held,
    /// before the mutation is applied in memory.
    async fn append(&self, state: &mut State, entry: &JournalEntry) -> Result<(), StoreError> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        let path = dir.join(JOURNAL_FILE);
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| StoreError::Insert(format!("journal: {e}")))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Insert(format!("open {}: {e}", path.display())))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::Insert(format!("append {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Insert(format!("append {}: {e}", path.display())))?;

        state.pending += 1;
        Ok(())
    }

    /// Fold the journal into a fresh snapshot. Called with the write lock
    /// held so no append lands between the snapshot and the truncation.
    ///
    /// Replaying a journal over a snapshot that already contains it yields
    /// the same records, so a failed truncation is harmless.
    async fn compact(&self, state: &mut State) -> Result<(), StoreError> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        if state.pending == 0 {
            return Ok(());
        }

        let snapshot = Snapshot {
            last_updated: state.last_updated,
            records: state.records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StoreError::Insert(format!("snapshot: {e}")))?;
        write_atomic(&dir.join(SNAPSHOT_FILE), &bytes).await?;

        let journal = dir.join(JOURNAL_FILE);
        match tokio::fs::remove_file(&journal).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::Insert(format!(
                    "truncate {}: {e}",
                    journal.display()
                )))
            }
        }

        debug!(
            "Compacted {} journal entries into {} records",
            state.pending,
            state.records.len()
        );
        state.pending = 0;
        Ok(())
    }

    async fn file_len(path: PathBuf) -> u64 {
        tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn manifest_of(state: &State) -> Result<&IndexManifest, StoreError> {
    state.manifest.as_ref().ok_or(StoreError::NotInitialized)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn init(&self, manifest: &IndexManifest) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if let Some(current) = &state.manifest {
            return check_manifest(Some(current), manifest);
        }

        if let Some(dir) = &self.snapshot_dir {
            let stored = read_manifest(dir).await?;
            check_manifest(stored.as_ref(), manifest)?;
            if stored.is_none() {
                write_manifest(dir, manifest).await?;
            }
            if let Some(snapshot) = Self::load_snapshot(dir).await? {
                state.last_updated = snapshot.last_updated;
                state.records = snapshot
                    .records
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect();
            }
            let journal = Self::load_journal(dir).await?;
            state.pending = journal.len();
            for entry in journal {
                state.apply(entry);
            }
            info!(
                "Loaded {} records from {} ({} journal entries)",
                state.records.len(),
                dir.display(),
                state.pending
            );
            self.compact(&mut state).await?;
        }

        state.manifest = Some(manifest.clone());
        debug!("MemoryStore initialized ({})", manifest);
        Ok(())
    }

    async fn upsert(&self, record: VectorRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let dimension = manifest_of(&state)?.dimension;
        if record.embedding.len() != dimension {
            return Err(StoreError::Insert(format!(
                "embedding has {} dimensions, index expects {dimension}",
                record.embedding.len()
            )));
        }

        let entry = JournalEntry::Upsert {
            at: Utc::now(),
            record,
        };
        self.append(&mut state, &entry).await?;
        state.apply(entry);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        manifest_of(&state)?;
        if !state.records.contains_key(id) {
            return Ok(false);
        }
        let entry = JournalEntry::Delete {
            at: Utc::now(),
            id: id.to_string(),
        };
        self.append(&mut state, &entry).await?;
        state.apply(entry);
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let state = self.state.read().await;
        manifest_of(&state)?;
        Ok(state.records.get(id).cloned())
    }

    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let state = self.state.read().await;
        let manifest = manifest_of(&state)?;
        if embedding.len() != manifest.dimension {
            return Err(StoreError::Query(format!(
                "query has {} dimensions, index expects {}",
                embedding.len(),
                manifest.dimension
            )));
        }

        let metric = manifest.metric;
        let mut scored: Vec<(f32, &VectorRecord)> = state
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| (metric.distance(embedding, &r.embedding), r))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(distance, record)| SearchHit::new(record.clone(), distance))
            .collect())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        manifest_of(&state)?;
        let dropped = state.records.len();
        let entry = JournalEntry::Reset { at: Utc::now() };
        self.append(&mut state, &entry).await?;
        state.apply(entry);
        info!("Reset vector store, dropped {} records", dropped);
        self.compact(&mut state).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.compact(&mut state).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.state.read().await.records.len() as u64)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read().await;
        let index_size_bytes = match &self.snapshot_dir {
            Some(dir) => {
                Self::file_len(dir.join(SNAPSHOT_FILE)).await
                    + Self::file_len(dir.join(JOURNAL_FILE)).await
            }
            None => 0,
        };
        Ok(StoreStats {
            total_records: state.records.len() as u64,
            index_size_bytes,
            last_updated: state.last_updated,
            manifest: state.manifest.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::{DistanceMetric, DocumentMetadata};
    use tempfile::tempdir;

    fn manifest() -> IndexManifest {
        IndexManifest::new("test-model", 3, DistanceMetric::Cosine)
    }

    fn record(id: &str, embedding: [f32; 3], doc_type: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding: embedding.to_vec(),
            preview: format!("preview of {id}"),
            metadata: DocumentMetadata {
                title: id.to_uppercase(),
                doc_type: doc_type.to_string(),
                ..Default::default()
            },
        }
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.init(&manifest()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_requires_init() {
        let store = MemoryStore::new();
        let result = store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await;
        assert!(matches!(result, Err(StoreError::NotInitialized)));
        assert!(matches!(
            store.search(&[1.0, 0.0, 0.0], 5, None).await,
            Err(StoreError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let store = store().await;
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();

        let mut updated = record("a", [0.0, 1.0, 0.0], "upload");
        updated.preview = "new".to_string();
        store.upsert(updated.clone()).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let store = store().await;
        let mut bad = record("a", [1.0, 0.0, 0.0], "article");
        bad.embedding.push(0.0);
        assert!(matches!(store.upsert(bad).await, Err(StoreError::Insert(_))));
        assert!(matches!(
            store.search(&[1.0, 0.0], 5, None).await,
            Err(StoreError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = store().await;
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
        assert!(!store.delete("missing").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = store().await;
        store.upsert(record("far", [0.0, 0.0, 1.0], "article")).await.unwrap();
        store.upsert(record("near", [1.0, 0.1, 0.0], "article")).await.unwrap();
        store.upsert(record("mid", [1.0, 1.0, 0.0], "article")).await.unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        for hit in &hits {
            assert!((hit.similarity - (1.0 - hit.distance)).abs() < 1e-6);
        }

        let top = store.search(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(top.len(), 2);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let store = store().await;
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
        store.upsert(record("u", [1.0, 0.0, 0.0], "upload")).await.unwrap();

        let filter = MetadataFilter::new().with("doc_type", "upload");
        let hits = store.search(&[1.0, 0.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "u");

        let none = MetadataFilter::new().with("doc_type", "podcast");
        assert!(store
            .search(&[1.0, 0.0, 0.0], 10, Some(&none))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = store().await;
        assert!(store.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_keeps_manifest() {
        let store = store().await;
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
        store.reset().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.manifest, Some(manifest()));
        store.upsert(record("b", [1.0, 0.0, 0.0], "article")).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryStore::persistent(dir.path());
            store.init(&manifest()).await.unwrap();
            store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
            store.upsert(record("b", [0.0, 1.0, 0.0], "upload")).await.unwrap();
            store.delete("b").await.unwrap();
        }

        let reopened = MemoryStore::persistent(dir.path());
        reopened.init(&manifest()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert_eq!(
            reopened.get("a").await.unwrap().unwrap().preview,
            "preview of a"
        );
        assert!(reopened.stats().await.unwrap().index_size_bytes > 0);
    }

    fn journal_lines(dir: &Path) -> usize {
        std::fs::read_to_string(dir.join(JOURNAL_FILE))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_bulk_upserts_append_without_rewriting_snapshot() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::persistent(dir.path());
        store.init(&manifest()).await.unwrap();

        for i in 0..50 {
            store
                .upsert(record(&format!("r{i}"), [1.0, i as f32, 0.0], "article"))
                .await
                .unwrap();
        }
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());
        assert_eq!(journal_lines(dir.path()), 50);

        store.flush().await.unwrap();
        assert!(dir.path().join(SNAPSHOT_FILE).exists());
        assert_eq!(journal_lines(dir.path()), 0);
        assert_eq!(store.count().await.unwrap(), 50);

        store.upsert(record("r0", [0.0, 0.0, 1.0], "upload")).await.unwrap();
        assert_eq!(journal_lines(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_journal_replayed_on_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryStore::persistent(dir.path());
            store.init(&manifest()).await.unwrap();
            store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
            store.flush().await.unwrap();
            store.upsert(record("b", [0.0, 1.0, 0.0], "article")).await.unwrap();
            store.upsert(record("a", [0.0, 0.0, 1.0], "upload")).await.unwrap();
            store.delete("b").await.unwrap();
        }

        let reopened = MemoryStore::persistent(dir.path());
        reopened.init(&manifest()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let a = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(a.metadata.doc_type, "upload");
        assert_eq!(journal_lines(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_reset_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryStore::persistent(dir.path());
            store.init(&manifest()).await.unwrap();
            store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
            store.reset().await.unwrap();
            store.upsert(record("b", [0.0, 1.0, 0.0], "article")).await.unwrap();
        }

        let reopened = MemoryStore::persistent(dir.path());
        reopened.init(&manifest()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        assert!(reopened.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_torn_last_journal_line_is_dropped() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryStore::persistent(dir.path());
            store.init(&manifest()).await.unwrap();
            store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
        }
        let journal = dir.path().join(JOURNAL_FILE);
        let mut content = std::fs::read_to_string(&journal).unwrap();
        content.push_str(r#"{"op":"upsert","at":"2024-"#);
        std::fs::write(&journal, content).unwrap();

        let reopened = MemoryStore::persistent(dir.path());
        reopened.init(&manifest()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_record_invisible() {
        let dir = tempdir().unwrap();
        let vectors = dir.path().join("vectors");
        let store = MemoryStore::persistent(&vectors);
        store.init(&manifest()).await.unwrap();
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();

        // Replace the directory with a plain file so every append fails.
        std::fs::remove_dir_all(&vectors).unwrap();
        std::fs::write(&vectors, b"not a directory").unwrap();

        let result = store.upsert(record("b", [0.0, 1.0, 0.0], "article")).await;
        assert!(matches!(result, Err(StoreError::Insert(_))));
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);

        assert!(store.delete("a").await.is_err());
        assert!(store.get("a").await.unwrap().is_some());
        assert!(store
            .search(&[0.0, 1.0, 0.0], 5, None)
            .await
            .unwrap()
            .iter()
            .all(|h| h.id != "b"));
    }

    #[tokio::test]
    async fn test_reopen_with_other_manifest_fails() {
        let dir = tempdir().unwrap();
        MemoryStore::persistent(dir.path())
            .init(&manifest())
            .await
            .unwrap();

        let other = IndexManifest::new("other-model", 3, DistanceMetric::Cosine);
        let result = MemoryStore::persistent(dir.path()).init(&other).await;
        assert!(matches!(result, Err(StoreError::ManifestMismatch { .. })));
    }

    #[tokio::test]
    async fn test_reinit_is_idempotent() {
        let store = store().await;
        store.upsert(record("a", [1.0, 0.0, 0.0], "article")).await.unwrap();
        store.init(&manifest()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let other = IndexManifest::new("test-model", 3, DistanceMetric::L2);
        assert!(store.init(&other).await.is_err());
    }
}
