//! Core types for newsdesk.
//!
//! ## Extraction
//! - [`SourceFormat`]: closed set of recognised document formats
//! - [`ExtractedDocument`]: normalized text, structured sections and metadata for one input
//! - [`StructuredSection`]: per-format units (pages, sheets, paragraphs, tables)
//! - [`ExtractionStatus`]: ok, unsupported, or failed with a reason
//!
//! ## Entities
//! - [`EntityKind`]: articles and uploaded documents
//! - [`IndexableEntity`]: a system-of-record row that can be embedded
//! - [`NewArticle`] / [`NewUpload`]: rows written by the intake flows
//!
//! ## Vector index
//! - [`VectorRecord`]: the persisted unit (embedding, preview, metadata)
//! - [`DocumentMetadata`]: the metadata attached to every record
//! - [`MetadataFilter`]: exact-match, conjunctive filter
//! - [`SearchHit`]: one ranked result
//! - [`IndexManifest`]: model identity the stored vectors were produced with
//! - [`DistanceMetric`]: vector distance calculation method
//!
//! ## Outcomes
//! - [`IndexOutcome`], [`SearchOutcome`], [`PassReport`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ============================================================================
// Source Formats
// ============================================================================

/// Document format, detected from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Excel,
    Word,
    Text,
    Html,
    Unknown,
}

impl SourceFormat {
    /// Every format with an extraction handler.
    pub const SUPPORTED: [SourceFormat; 5] = [
        SourceFormat::Pdf,
        SourceFormat::Excel,
        SourceFormat::Word,
        SourceFormat::Text,
        SourceFormat::Html,
    ];

    /// Lowercase extensions (without the dot) mapped to this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            SourceFormat::Pdf => &["pdf"],
            SourceFormat::Excel => &["xlsx", "xls", "xlsm"],
            SourceFormat::Word => &["docx"],
            SourceFormat::Text => &["txt", "md"],
            SourceFormat::Html => &["html", "htm"],
            SourceFormat::Unknown => &[],
        }
    }

    /// Map an extension (with or without leading dot) to a format, ignoring case.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::SUPPORTED
            .into_iter()
            .find(|format| format.extensions().contains(&ext.as_str()))
            .unwrap_or(SourceFormat::Unknown)
    }

    /// Detect the format of a declared filename.
    pub fn from_filename(filename: &str) -> Self {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(SourceFormat::Unknown, Self::from_extension)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Pdf => "pdf",
            SourceFormat::Excel => "excel",
            SourceFormat::Word => "word",
            SourceFormat::Text => "text",
            SourceFormat::Html => "html",
            SourceFormat::Unknown => "unknown",
        }
    }

    pub fn is_supported(self) -> bool {
        self != SourceFormat::Unknown
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Outcome of running the extractor on one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Ok,
    UnsupportedFormat,
    ExtractionFailed(String),
}

/// One row of a spreadsheet, keyed by column name.
pub type SheetRow = BTreeMap<String, String>;

/// A worksheet with every data row retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSection {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<SheetRow>,
}

/// A table from a word-processing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSection {
    /// Position of the table in the document (0-indexed)
    pub index: usize,
    pub rows: usize,
    pub columns: usize,
    /// Cell text, row-major
    pub cells: Vec<Vec<String>>,
    /// Rows rendered as `a | b | c`, joined by newlines
    pub text: String,
}

/// Format-specific structural unit, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredSection {
    /// A PDF page with extractable text (1-indexed)
    Page { number: u32, text: String },
    /// An Excel worksheet
    Sheet(SheetSection),
    /// Non-empty body paragraphs of a Word document
    Paragraphs { items: Vec<String> },
    /// A Word table
    Table(TableSection),
}

/// Result of extracting one document.
///
/// `normalized_text` is what gets embedded and previewed. Callers branch on
/// `status` rather than on errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub filename: String,
    pub source_format: SourceFormat,
    pub normalized_text: String,
    pub sections: Vec<StructuredSection>,
    pub metadata: BTreeMap<String, Value>,
    pub status: ExtractionStatus,
}

impl ExtractedDocument {
    /// A successful extraction.
    pub fn ok(
        filename: impl Into<String>,
        source_format: SourceFormat,
        normalized_text: String,
        sections: Vec<StructuredSection>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            filename: filename.into(),
            source_format,
            normalized_text,
            sections,
            metadata,
            status: ExtractionStatus::Ok,
        }
    }

    /// The filename's extension is not recognised.
    pub fn unsupported(filename: impl Into<String>) -> Self {
        Self::empty(
            filename,
            SourceFormat::Unknown,
            ExtractionStatus::UnsupportedFormat,
        )
    }

    /// The format handler failed.
    pub fn failed(
        filename: impl Into<String>,
        source_format: SourceFormat,
        reason: impl Into<String>,
    ) -> Self {
        Self::empty(
            filename,
            source_format,
            ExtractionStatus::ExtractionFailed(reason.into()),
        )
    }

    fn empty(filename: impl Into<String>, source_format: SourceFormat, status: ExtractionStatus) -> Self {
        Self {
            filename: filename.into(),
            source_format,
            normalized_text: String::new(),
            sections: Vec::new(),
            metadata: BTreeMap::new(),
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExtractionStatus::Ok
    }

    /// Whether the normalized text holds anything worth embedding.
    pub fn has_text(&self) -> bool {
        !self.normalized_text.trim().is_empty()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ExtractionStatus::ExtractionFailed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn word_count(&self) -> usize {
        self.normalized_text.split_whitespace().count()
    }

    pub fn page_count(&self) -> Option<u32> {
        self.metadata
            .get("page_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Source table of an indexable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Article,
    Upload,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Article, EntityKind::Upload];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Article => "article",
            EntityKind::Upload => "upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(EntityKind::Article),
            "upload" => Some(EntityKind::Upload),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kinds a selection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindSelector {
    Article,
    Upload,
    #[default]
    All,
}

impl KindSelector {
    pub fn kinds(self) -> &'static [EntityKind] {
        match self {
            KindSelector::Article => &[EntityKind::Article],
            KindSelector::Upload => &[EntityKind::Upload],
            KindSelector::All => &EntityKind::ALL,
        }
    }
}

impl From<EntityKind> for KindSelector {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Article => KindSelector::Article,
            EntityKind::Upload => KindSelector::Upload,
        }
    }
}

/// Display fields of an entity, copied into vector metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Article title or upload filename
    pub title: String,
    /// Publisher name or upload file type
    pub source: String,
    /// Canonical URL or stored file path
    pub url: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// A system-of-record row that can be embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexableEntity {
    /// Row id, unique within its table
    pub id: i64,
    pub kind: EntityKind,
    /// Full content when present, else the short content
    pub text: String,
    pub descriptor: EntityDescriptor,
    pub indexed: bool,
}

impl IndexableEntity {
    /// Identifier of this entity inside the vector index.
    ///
    /// Article and upload ids come from separate sequences, so the kind is
    /// part of the key.
    pub fn document_id(&self) -> String {
        document_id(self.kind, self.id)
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.descriptor.title.clone(),
            source: self.descriptor.source.clone(),
            url: self.descriptor.url.clone().unwrap_or_default(),
            date: self
                .descriptor
                .date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            doc_type: self.kind.as_str().to_string(),
            indexed_at: None,
        }
    }

    pub fn to_index_document(&self) -> IndexDocument {
        IndexDocument {
            id: self.document_id(),
            text: self.text.clone(),
            metadata: self.metadata(),
        }
    }
}

/// Build the vector-index id for an entity.
pub fn document_id(kind: EntityKind, id: i64) -> String {
    format!("{}-{}", kind.as_str(), id)
}

/// Split a vector-index id back into kind and row id.
pub fn parse_document_id(document_id: &str) -> Option<(EntityKind, i64)> {
    let (kind, id) = document_id.split_once('-')?;
    Some((EntityKind::parse(kind)?, id.parse().ok()?))
}

/// An article as delivered by the scraping flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub full_content: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub scraped_date: DateTime<Utc>,
}

/// An uploaded document after extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUpload {
    pub filename: String,
    pub file_type: SourceFormat,
    pub file_path: Option<String>,
    pub file_size: u64,
    pub extracted_text: String,
    pub structured_data: Vec<StructuredSection>,
    pub word_count: usize,
    pub page_count: Option<u32>,
    pub metadata: BTreeMap<String, Value>,
}

impl NewUpload {
    pub fn from_document(
        document: &ExtractedDocument,
        file_path: Option<String>,
        file_size: u64,
    ) -> Self {
        Self {
            filename: document.filename.clone(),
            file_type: document.source_format,
            file_path,
            file_size,
            extracted_text: document.normalized_text.clone(),
            structured_data: document.sections.clone(),
            word_count: document.word_count(),
            page_count: document.page_count(),
            metadata: document.metadata.clone(),
        }
    }
}

/// Row counts in the system of record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStats {
    pub articles: u64,
    pub uploads: u64,
    pub unindexed_articles: u64,
    pub unindexed_uploads: u64,
}

// ============================================================================
// Embedding
// ============================================================================

/// Configuration for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Normalize embeddings to unit length
    pub normalize: bool,
    /// Batch size for processing
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: 32,
        }
    }
}

/// Output from embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// The embedding vector
    pub embedding: Vec<f32>,
    /// Number of tokens in input
    pub token_count: usize,
}

// ============================================================================
// Vector Index
// ============================================================================

/// Metadata stored with every vector record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub source: String,
    pub url: String,
    pub date: String,
    pub doc_type: String,
    /// Set by the index on every write
    pub indexed_at: Option<DateTime<Utc>>,
}

impl DocumentMetadata {
    /// Keys a [`MetadataFilter`] can constrain.
    pub const FILTER_KEYS: [&'static str; 5] = ["title", "source", "url", "date", "doc_type"];

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "title" => Some(&self.title),
            "source" => Some(&self.source),
            "url" => Some(&self.url),
            "date" => Some(&self.date),
            "doc_type" => Some(&self.doc_type),
            _ => None,
        }
    }
}

/// Exact key/value filter; every condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.conditions.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every key is one records can carry.
    pub fn is_satisfiable(&self) -> bool {
        self.conditions
            .keys()
            .all(|k| DocumentMetadata::FILTER_KEYS.contains(&k.as_str()))
    }

    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value.as_str()))
    }
}

/// An entity ready to be written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// The persisted unit of the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    /// Truncated copy of the text, for display only
    pub preview: String,
    pub metadata: DocumentMetadata,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub preview: String,
    pub metadata: DocumentMetadata,
    pub distance: f32,
    /// Always `1 - distance`
    pub similarity: f32,
}

impl SearchHit {
    pub fn new(record: VectorRecord, distance: f32) -> Self {
        Self {
            id: record.id,
            preview: record.preview,
            metadata: record.metadata,
            distance,
            similarity: 1.0 - distance,
        }
    }
}

/// Distance metric for vector search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Dot => "dot",
        }
    }

    /// Distance between two equal-length vectors. Smaller is closer.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot(a, b) / (norm_a * norm_b)
            }
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Dot => 1.0 - dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Identity of the model that produced the stored vectors.
///
/// Queries are only comparable with stored vectors when the manifest matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl IndexManifest {
    pub fn new(model: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            model: model.into(),
            dimension,
            metric,
        }
    }
}

impl fmt::Display for IndexManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.dimension, self.metric.as_str())
    }
}

/// Vector store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: u64,
    /// On-disk size in bytes, zero for purely in-memory stores
    pub index_size_bytes: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub manifest: Option<IndexManifest>,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a single index mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

impl IndexOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Result of a search, failures included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub hits: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn ok(hits: Vec<SearchHit>) -> Self {
        Self {
            success: true,
            hits,
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            hits: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Counts from one indexing pass, with per-entity outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub outcomes: Vec<IndexOutcome>,
}

impl PassReport {
    pub fn from_outcomes(outcomes: Vec<IndexOutcome>) -> Self {
        Self {
            attempted: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.success).count(),
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &IndexOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn is_partial(&self) -> bool {
        self.succeeded < self.attempted
    }
}
