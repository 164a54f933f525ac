//! # docqa CLI
//!
//! The `docqa` binary drives the document question-answering service. It
//! can run the HTTP API or exercise the same pipeline directly from the
//! command line: ingest files, ask questions, and manage indexed
//! documents.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite index schema |
//! | `docqa serve` | Start the HTTP API server |
//! | `docqa ingest <path>` | Extract, chunk, embed, and index a file |
//! | `docqa query "<question>"` | Answer a question from the index |
//! | `docqa docs list` | List indexed documents |
//! | `docqa docs get <id>` | Show one document's details |
//! | `docqa docs content <id>` | Print a document's reconstructed text |
//! | `docqa docs update <id>` | Update tags/description |
//! | `docqa docs delete <id>` | Delete a document and its chunks |
//! | `docqa stats` | Index statistics |
//! | `docqa reset` | Wipe the collection |

mod cache;
mod chunk;
mod config;
mod db;
mod embedding;
mod extract;
mod ingest;
mod llm;
mod migrate;
mod models;
mod query;
mod server;
mod store;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedding::{CachedEmbedder, EmbeddingProvider};
use crate::llm::AnswerGenerator;
use crate::store::{MetadataUpdate, VectorStore};

/// docqa — a document question-answering service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — upload documents, index them as embedded chunks, ask questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema.
    ///
    /// Creates the SQLite database file and the chunks table. Idempotent.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Ingest a file: extract text, chunk, embed, and index it.
    Ingest {
        /// Path to the file to ingest.
        path: PathBuf,

        /// Comma-separated tags to stamp on the document.
        #[arg(long)]
        tags: Option<String>,

        /// Free-text description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Answer a question from the indexed documents.
    Query {
        /// The question to answer.
        question: String,

        /// Maximum number of source chunks to retrieve.
        #[arg(long, default_value_t = 3)]
        max_results: usize,
    },

    /// Manage indexed documents.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Show index statistics.
    Stats,

    /// Delete every indexed chunk and re-initialize an empty index.
    Reset,
}

#[derive(Subcommand)]
enum DocsAction {
    /// List all documents.
    List,
    /// Show one document's details.
    Get { id: String },
    /// Print a document's reconstructed text content.
    Content { id: String },
    /// Update a document's tags and/or description.
    Update {
        id: String,
        /// Comma-separated replacement tag list.
        #[arg(long)]
        tags: Option<String>,
        /// Replacement description.
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a document and all of its chunks.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docqa=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest {
            path,
            tags,
            description,
        } => {
            run_ingest(&cfg, &path, tags, description).await?;
        }
        Commands::Query {
            question,
            max_results,
        } => {
            run_query(&cfg, &question, max_results).await?;
        }
        Commands::Docs { action } => {
            let store = open_store(&cfg).await?;
            match action {
                DocsAction::List => run_docs_list(&store).await,
                DocsAction::Get { id } => run_docs_get(&store, &id).await?,
                DocsAction::Content { id } => run_docs_content(&store, &id).await?,
                DocsAction::Update {
                    id,
                    tags,
                    description,
                } => run_docs_update(&store, &id, tags, description).await?,
                DocsAction::Delete { id } => run_docs_delete(&store, &id).await?,
            }
        }
        Commands::Stats => {
            let store = open_store(&cfg).await?;
            run_stats(&cfg, &store).await?;
        }
        Commands::Reset => {
            let store = open_store(&cfg).await?;
            store.delete_collection().await?;
            println!("Index reset.");
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<VectorStore> {
    let pool = db::connect(&cfg.storage.db_path).await?;
    migrate::create_schema(&pool).await?;
    Ok(VectorStore::new(pool))
}

fn build_embedder(cfg: &Config) -> Result<CachedEmbedder> {
    let cache = EmbeddingCache::new(&cfg.storage.cache_dir)?;
    let provider = EmbeddingProvider::from_config(&cfg.embedding)?;
    Ok(CachedEmbedder::new(
        provider,
        cache,
        cfg.embedding.batch_size,
    ))
}

async fn run_ingest(
    cfg: &Config,
    path: &std::path::Path,
    tags: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("path has no filename: {}", path.display()))?
        .to_string();

    // Validate before reading or touching any provider, so a rejected
    // upload does no work.
    validate::validate_extension(&validate::validate_filename(&filename)?)?;

    let bytes = std::fs::read(path)?;
    let tag_list: Vec<String> = tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let store = open_store(cfg).await?;
    let embedder = build_embedder(cfg)?;

    let outcome =
        ingest::ingest_bytes(cfg, &store, &embedder, &bytes, &filename, tag_list, description)
            .await?;

    println!("ingested {}", outcome.filename);
    println!("  document_id: {}", outcome.document_id);
    println!("  chunks:      {}", outcome.chunks_created);
    println!("  uploaded_at: {}", outcome.uploaded_at);
    Ok(())
}

async fn run_query(cfg: &Config, question: &str, max_results: usize) -> Result<()> {
    // Validate before building providers.
    validate::validate_query(
        question,
        cfg.limits.min_query_chars,
        cfg.limits.max_query_chars,
    )?;

    let store = open_store(cfg).await?;
    let embedder = build_embedder(cfg)?;
    let generator = AnswerGenerator::from_config(&cfg.llm)?;

    let outcome =
        query::answer_question(cfg, &store, &embedder, &generator, question, max_results).await?;

    match outcome {
        None => println!("No relevant documents found."),
        Some(outcome) => {
            println!("{}", outcome.answer);
            println!();
            println!("--- Sources ({}) ---", outcome.sources.len());
            for (i, source) in outcome.sources.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {}",
                    i + 1,
                    source.relevance_score,
                    source
                        .metadata
                        .get("filename")
                        .and_then(|v| v.as_str())
                        .unwrap_or("(unknown)")
                );
                println!("   \"{}\"", source.content.replace('\n', " "));
            }
            println!();
            println!(
                "model: {}  latency: {:.0}ms",
                outcome.model_used, outcome.latency_ms
            );
        }
    }
    Ok(())
}

async fn run_docs_list(store: &VectorStore) {
    let documents = store.all_documents().await;
    if documents.is_empty() {
        println!("No documents indexed.");
        return;
    }
    for doc in &documents {
        println!(
            "{}  {:<30} {:>4} chunks  {}",
            doc.document_id, doc.filename, doc.chunk_count, doc.uploaded_at
        );
    }
    println!();
    println!("{} documents", documents.len());
}

async fn run_docs_get(store: &VectorStore, id: &str) -> Result<()> {
    let doc = store
        .document_by_id(id)
        .await
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", id))?;

    println!("--- Document ---");
    println!("id:          {}", doc.document_id);
    println!("filename:    {}", doc.filename);
    println!("file_type:   {}", doc.file_type);
    println!("size:        {} bytes", doc.file_size_bytes);
    println!("uploaded_at: {}", doc.uploaded_at);
    println!("chunks:      {}", doc.chunk_count);
    println!("tags:        {}", doc.tags.join(", "));
    if let Some(ref description) = doc.description {
        println!("description: {}", description);
    }
    Ok(())
}

async fn run_docs_content(store: &VectorStore, id: &str) -> Result<()> {
    let content = store
        .document_content(id)
        .await
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", id))?;
    println!("{}", content);
    Ok(())
}

async fn run_docs_update(
    store: &VectorStore,
    id: &str,
    tags: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let updates = MetadataUpdate {
        tags: tags.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        }),
        description,
    };
    if updates.is_empty() {
        anyhow::bail!("nothing to update: pass --tags and/or --description");
    }

    if store.update_metadata(id, &updates).await? {
        println!("Updated {}.", id);
    } else {
        anyhow::bail!("document not found: {}", id);
    }
    Ok(())
}

async fn run_docs_delete(store: &VectorStore, id: &str) -> Result<()> {
    if store.document_by_id(id).await.is_none() {
        anyhow::bail!("document not found: {}", id);
    }
    if !store.delete_document(id).await {
        anyhow::bail!("document could not be deleted: {}", id);
    }
    println!("Deleted {}.", id);
    Ok(())
}

async fn run_stats(cfg: &Config, store: &VectorStore) -> Result<()> {
    let total_chunks = store.chunk_count().await?;
    let documents = store.all_documents().await;

    let db_size = std::fs::metadata(&cfg.storage.db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docqa — Index Stats");
    println!("===================");
    println!();
    println!("  Database:   {}", cfg.storage.db_path.display());
    println!("  Size:       {} bytes", db_size);
    println!("  Collection: {}", cfg.storage.collection_name);
    println!();
    println!("  Documents:  {}", documents.len());
    println!("  Chunks:     {}", total_chunks);
    Ok(())
}
