//! # newsdesk CLI
//!
//! Command-line interface for the newsdesk ingestion and indexing pipeline.
//!
//! Uploaded documents are extracted and stored in the system of record;
//! indexing passes embed every unindexed article and upload into the vector
//! index, which then answers semantic searches.
//!
//! ## Commands
//!
//! - `newsdesk ingest <FILES>...` - Extract and store uploaded documents
//! - `newsdesk extract <FILE>` - Show what extraction produces, without storing
//! - `newsdesk index` - Run one indexing pass
//! - `newsdesk rebuild [--force]` - Reset the vector index and reindex everything
//! - `newsdesk search <QUERY>` - Semantic search, with `source:` / `type:` filters
//! - `newsdesk status` - Record counts and index statistics
//!
//! ## Examples
//!
//! ```bash
//! newsdesk ingest reports/q3.xlsx memo.docx
//! newsdesk index
//! newsdesk search "chip export controls source:Reuters" --limit 5
//! newsdesk status --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newsdesk_core::{
    Embedder, EmbeddingConfig, ExtractedDocument, ExtractionStatus, IndexManifest, NewUpload,
    PassReport, RecordStore, SearchHit, VectorStore,
};
#[cfg(feature = "candle")]
use newsdesk_embed::CandleEmbedder;
use newsdesk_embed::{EmbedderPool, EmbeddingCache, HashingEmbedder};
use newsdesk_extract::{DocumentExtractor, DocumentSource};
use newsdesk_index::{
    CandidateSelector, IndexUpdate, IndexingOrchestrator, OrchestratorConfig, VectorIndex,
    VectorIndexConfig,
};
use newsdesk_query::QueryExecutor;
use newsdesk_records::SqliteRecords;
#[cfg(feature = "lancedb")]
use newsdesk_store::LanceStore;
use newsdesk_store::{manifest::read_manifest, MemoryStore};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::{Config, EmbedBackend, StoreBackend};

#[derive(Parser)]
#[command(name = "newsdesk")]
#[command(about = "Document ingestion and semantic indexing for a news dashboard")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/newsdesk/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract uploaded files and store them for indexing
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract a file and print the result without storing it
    Extract {
        /// File to extract
        file: PathBuf,
    },

    /// Run one indexing pass
    Index,

    /// Reset the vector index and reindex every article and upload
    Rebuild {
        /// Discard the existing index even if another model built it
        #[arg(long)]
        force: bool,
    },

    /// Search the index
    Search {
        /// Query string, with optional `key:value` filters
        query: String,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show record and index status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for one ingested file.
#[derive(Serialize)]
struct IngestItem {
    file: String,
    status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    /// Why an extracted file could not be stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    store_error: Option<String>,
    words: usize,
    has_text: bool,
}

/// Output structure for search results.
#[derive(Serialize)]
struct SearchOutput {
    query: String,
    results: Vec<ResultItem>,
}

#[derive(Serialize)]
struct ResultItem {
    id: String,
    title: String,
    source: String,
    doc_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    date: String,
    similarity: f32,
    distance: f32,
    preview: String,
}

impl From<&SearchHit> for ResultItem {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            title: hit.metadata.title.clone(),
            source: hit.metadata.source.clone(),
            doc_type: hit.metadata.doc_type.clone(),
            url: hit.metadata.url.clone(),
            date: hit.metadata.date.clone(),
            similarity: hit.similarity,
            distance: hit.distance,
            preview: truncate(&hit.preview, 200),
        }
    }
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    articles: u64,
    uploads: u64,
    unindexed_articles: u64,
    unindexed_uploads: u64,
    vector_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest: Option<IndexManifest>,
    vectors: u64,
    index_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

// ============================================================================
// Component construction
// ============================================================================

async fn open_records(config: &Config) -> Result<Arc<SqliteRecords>> {
    let url = config.database_url()?;
    let records = SqliteRecords::connect(&url)
        .await
        .with_context(|| format!("Failed to open database {url}"))?;
    Ok(Arc::new(records))
}

/// Build the embedding stack: backend → cache → concurrency pool.
async fn create_embedder(config: &Config) -> Result<Arc<EmbedderPool>> {
    let settings = &config.embedding;
    let backend: Arc<dyn Embedder> = match settings.backend {
        #[cfg(feature = "candle")]
        EmbedBackend::Candle => {
            let embedder = CandleEmbedder::with_model(
                config.model_cache_dir()?,
                settings.model.clone(),
                settings.dimension,
            );
            info!("Initializing embedder (this may download the model on first run)...");
            embedder
                .init()
                .await
                .context("Failed to initialize embedder")?;
            Arc::new(embedder)
        }
        #[cfg(not(feature = "candle"))]
        EmbedBackend::Candle => {
            anyhow::bail!(
                "embedding.backend = \"candle\" needs a build with the `candle` feature; \
                 use backend = \"hashing\" or rebuild with --features candle"
            )
        }
        EmbedBackend::Hashing => Arc::new(HashingEmbedder::new(settings.dimension)),
    };

    let cached = Arc::new(EmbeddingCache::with_capacity(backend, settings.cache_size));
    Ok(Arc::new(EmbedderPool::new(cached, settings.max_concurrent)))
}

fn create_store(config: &Config, path: &Path) -> Result<Arc<dyn VectorStore>> {
    match config.storage.backend {
        StoreBackend::Snapshot => Ok(Arc::new(MemoryStore::persistent(path))),
        #[cfg(feature = "lancedb")]
        StoreBackend::Lancedb => Ok(Arc::new(LanceStore::new(path.to_path_buf()))),
        #[cfg(not(feature = "lancedb"))]
        StoreBackend::Lancedb => {
            anyhow::bail!("storage.backend = \"lancedb\" needs a build with the `lancedb` feature")
        }
    }
}

fn index_config(config: &Config) -> VectorIndexConfig {
    VectorIndexConfig {
        preview_chars: config.index.preview_chars,
        metric: config.index.metric,
        workers: config.index.workers,
        embed_config: EmbeddingConfig {
            batch_size: config.embedding.batch_size,
            ..EmbeddingConfig::default()
        },
    }
}

/// Open the vector index. Failure here is a configuration fault.
async fn open_index(config: &Config) -> Result<Arc<VectorIndex>> {
    let path = config.vector_path()?;
    let store = create_store(config, &path)?;
    let embedder = create_embedder(config).await?;
    let index = VectorIndex::open(store, embedder, index_config(config))
        .await
        .context("Indexing subsystem refused to start")?;
    Ok(Arc::new(index))
}

fn create_orchestrator(
    config: &Config,
    records: Arc<dyn RecordStore>,
    index: Arc<VectorIndex>,
) -> IndexingOrchestrator {
    IndexingOrchestrator::new(
        CandidateSelector::with_limit(Arc::clone(&records), config.index.limit_per_kind),
        records,
        index,
        OrchestratorConfig {
            workers: config.index.workers,
            ..OrchestratorConfig::default()
        },
    )
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };

    match &config.logging.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;
        }
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.clone()).context("Failed to load config")?;
    init_logging(&cli, &config)?;

    match &cli.command {
        Commands::Ingest { files } => ingest(&cli, &config, files).await,
        Commands::Extract { file } => extract(&cli, file).await,
        Commands::Index => index(&cli, &config).await,
        Commands::Rebuild { force } => rebuild(&cli, &config, *force).await,
        Commands::Search { query, limit } => search(&cli, &config, query, *limit).await,
        Commands::Status => status(&cli, &config).await,
        Commands::Config { action } => show_config(&cli, &config, action),
    }
}

async fn ingest(cli: &Cli, config: &Config, files: &[PathBuf]) -> Result<()> {
    let records = open_records(config).await?;
    let extractor = DocumentExtractor::new();
    let mut items = Vec::with_capacity(files.len());

    for path in files {
        items.push(ingest_one(records.as_ref(), &extractor, path).await);
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            for item in &items {
                match (&item.status, item.id) {
                    (ExtractionStatus::Ok, Some(id)) => {
                        println!("{} -> upload-{} ({} words)", item.file, id, item.words);
                    }
                    (ExtractionStatus::UnsupportedFormat, _) => {
                        println!("{}: unsupported format", item.file);
                    }
                    (ExtractionStatus::ExtractionFailed(reason), _) => {
                        println!("{}: extraction failed: {}", item.file, reason);
                    }
                    (ExtractionStatus::Ok, None) => match &item.store_error {
                        Some(e) => println!("{}: not stored: {}", item.file, e),
                        None => println!("{}: not stored", item.file),
                    },
                }
            }
        }
    }
    Ok(())
}

/// Extract and store one file. A failed save is reported on the item so the
/// remaining files are still ingested.
async fn ingest_one(
    records: &dyn RecordStore,
    extractor: &DocumentExtractor,
    path: &Path,
) -> IngestItem {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);

    let document = extractor
        .extract(DocumentSource::Path(path.to_path_buf()), &filename)
        .await;

    // Only successful extractions become uploads; the rest are reported.
    let mut store_error = None;
    let id = if document.is_ok() {
        let upload = NewUpload::from_document(&document, Some(path.display().to_string()), size);
        match records.save_upload(&upload).await {
            Ok(id) => {
                if !document.has_text() {
                    warn!("{} has no extractable text and will not be indexed", filename);
                }
                Some(id)
            }
            Err(e) => {
                warn!("Failed to store {}: {}", filename, e);
                store_error = Some(e.to_string());
                None
            }
        }
    } else {
        warn!("Skipping {}: {:?}", filename, document.status);
        None
    };

    IngestItem {
        file: path.display().to_string(),
        status: document.status.clone(),
        id,
        store_error,
        words: document.word_count(),
        has_text: document.has_text(),
    }
}

async fn extract(cli: &Cli, file: &Path) -> Result<()> {
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Path has no file name")?;
    let document = DocumentExtractor::new()
        .extract(DocumentSource::Path(file.to_path_buf()), &filename)
        .await;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
        OutputFormat::Text => print_document(&document)?,
    }
    Ok(())
}

fn print_document(document: &ExtractedDocument) -> Result<()> {
    println!("File:     {}", document.filename);
    println!("Format:   {}", document.source_format);
    match &document.status {
        ExtractionStatus::Ok => println!("Status:   ok"),
        ExtractionStatus::UnsupportedFormat => println!("Status:   unsupported format"),
        ExtractionStatus::ExtractionFailed(reason) => println!("Status:   failed ({reason})"),
    }
    println!("Sections: {}", document.sections.len());
    println!("Metadata: {}", serde_json::to_string(&document.metadata)?);
    if document.has_text() {
        println!();
        println!("{}", document.normalized_text);
    }
    Ok(())
}

/// Log per-entity failures while a pass runs.
fn report_progress(orchestrator: &IndexingOrchestrator) -> tokio::task::JoinHandle<()> {
    let mut updates = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                IndexUpdate::EntityFailed { id, error } => warn!("Error: {}: {}", id, error),
                IndexUpdate::EntityIndexed { id } => tracing::debug!("Indexed: {}", id),
                IndexUpdate::PassFinished { .. } => break,
                IndexUpdate::PassStarted { .. } => {}
            }
        }
    })
}

fn print_report(cli: &Cli, report: &PassReport) -> Result<()> {
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("attempted: {}", report.attempted);
            println!("succeeded: {}", report.succeeded);
            for failure in report.failures() {
                println!(
                    "  {}: {}",
                    failure.id,
                    failure.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    Ok(())
}

async fn index(cli: &Cli, config: &Config) -> Result<()> {
    let records = open_records(config).await?;
    let index = open_index(config).await?;
    let orchestrator = create_orchestrator(config, records, index);

    let progress = report_progress(&orchestrator);
    let report = orchestrator
        .run_indexing_pass()
        .await
        .context("Indexing pass failed")?;
    progress.await.ok();

    print_report(cli, &report)
}

async fn rebuild(cli: &Cli, config: &Config, force: bool) -> Result<()> {
    if force {
        let path = config.vector_path()?;
        if path.exists() {
            warn!("Removing vector index at {}", path.display());
            tokio::fs::remove_dir_all(&path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }

    let records = open_records(config).await?;
    let index = open_index(config).await?;
    let orchestrator = create_orchestrator(config, records, index);

    let progress = report_progress(&orchestrator);
    let report = orchestrator.rebuild().await.context("Rebuild failed")?;
    progress.await.ok();

    print_report(cli, &report)
}

async fn search(cli: &Cli, config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let index = open_index(config).await?;
    let executor = QueryExecutor::new(index, config.query.default_limit, config.query.max_limit);

    let mut parsed = executor.parser().parse(query);
    if let Some(limit) = limit {
        parsed.limit = limit;
    }
    let hits = executor
        .execute_parsed(parsed)
        .await
        .context("Query execution failed")?;

    match cli.format {
        OutputFormat::Json => {
            let output = SearchOutput {
                query: query.to_string(),
                results: hits.iter().map(ResultItem::from).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Query: {query}\n");
            if hits.is_empty() {
                println!("No results found.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let item = ResultItem::from(hit);
                println!(
                    "{}. {} [{} / {}] (similarity: {:.3})",
                    i + 1,
                    item.title,
                    item.source,
                    item.doc_type,
                    item.similarity
                );
                if !item.url.is_empty() {
                    println!("   {}", item.url);
                }
                println!("   {}", truncate(&item.preview, 100));
                println!();
            }
        }
    }
    Ok(())
}

/// Status reads the stored manifest, so it never loads the embedding model.
async fn status(cli: &Cli, config: &Config) -> Result<()> {
    let records = open_records(config).await?;
    let counts = records.stats().await?;

    let path = config.vector_path()?;
    let manifest = read_manifest(&path).await.unwrap_or_else(|e| {
        warn!("Unreadable index manifest: {}", e);
        None
    });
    let store_stats = match &manifest {
        Some(manifest) => {
            let store = create_store(config, &path)?;
            store
                .init(manifest)
                .await
                .context("Failed to open vector store")?;
            Some(store.stats().await?)
        }
        None => None,
    };

    let output = StatusOutput {
        articles: counts.articles,
        uploads: counts.uploads,
        unindexed_articles: counts.unindexed_articles,
        unindexed_uploads: counts.unindexed_uploads,
        vector_path: path.display().to_string(),
        manifest,
        vectors: store_stats.as_ref().map_or(0, |s| s.total_records),
        index_size_bytes: store_stats.as_ref().map_or(0, |s| s.index_size_bytes),
        last_updated: store_stats
            .as_ref()
            .and_then(|s| s.last_updated)
            .map(|t| t.to_rfc3339()),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("Records");
            println!(
                "  Articles: {} ({} unindexed)",
                output.articles, output.unindexed_articles
            );
            println!(
                "  Uploads:  {} ({} unindexed)",
                output.uploads, output.unindexed_uploads
            );
            println!("Vector index at {}", output.vector_path);
            match &output.manifest {
                Some(manifest) => {
                    println!("  Model:   {manifest}");
                    println!("  Vectors: {}", output.vectors);
                    println!("  Size:    {} bytes", output.index_size_bytes);
                    if let Some(last) = &output.last_updated {
                        println!("  Updated: {last}");
                    }
                }
                None => println!("  Not created yet. Run 'newsdesk index' to create it."),
            }
        }
    }
    Ok(())
}

fn show_config(cli: &Cli, config: &Config, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => match cli.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
            OutputFormat::Text => {
                println!(
                    "{}",
                    toml::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
        },
        ConfigAction::Init => {
            println!("{}", Config::sample_toml());
        }
        ConfigAction::Path => {
            if let Some(path) = cli.config.clone().or_else(Config::config_path) {
                println!("{}", path.display());
            } else {
                println!("Could not determine config directory");
            }
        }
    }
    Ok(())
}

/// Truncate a string to max characters, adding ellipsis if needed.
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_chars {
        s
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
