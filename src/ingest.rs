//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: validation → extraction → chunking
//! → embedding (cache-aware) → index insert. Validation and content
//! errors short-circuit before any side effects; a storage or provider
//! failure after chunking leaves nothing indexed because the insert runs
//! in one transaction.

use anyhow::Result;
use serde::Serialize;

use crate::chunk::{build_chunks, DocumentMeta};
use crate::config::Config;
use crate::embedding::CachedEmbedder;
use crate::extract::extract_blocks;
use crate::models::format_ts_iso;
use crate::store::VectorStore;
use crate::validate;

/// Receipt for a completed ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub filename: String,
    pub chunks_created: usize,
    pub status: String,
    pub uploaded_at: String,
}

/// Ingest one uploaded file into the index.
pub async fn ingest_bytes(
    config: &Config,
    store: &VectorStore,
    embedder: &CachedEmbedder,
    bytes: &[u8],
    filename: &str,
    tags: Vec<String>,
    description: Option<String>,
) -> Result<IngestOutcome> {
    let safe_filename = validate::validate_filename(filename)?;
    let file_type = validate::validate_extension(&safe_filename)?;
    validate::validate_file_size(
        bytes.len() as u64,
        config.limits.min_file_bytes,
        config.limits.max_file_bytes,
    )?;

    tracing::info!(filename = %safe_filename, size = bytes.len(), "ingesting document");

    let blocks = extract_blocks(bytes, &safe_filename)?;

    let meta = DocumentMeta {
        filename: safe_filename.clone(),
        file_type,
        file_size: bytes.len() as i64,
        uploaded_at: chrono::Utc::now().timestamp(),
        tags,
        description,
    };
    let chunks = build_chunks(
        &blocks,
        &meta,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    )?;

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;

    let inserted = store.insert(&chunks, &vectors).await?;
    let document_id = chunks[0].document_id.clone();

    tracing::info!(%document_id, chunks = inserted, "document ingested");

    Ok(IngestOutcome {
        document_id,
        filename: safe_filename,
        chunks_created: inserted,
        status: "success".to_string(),
        uploaded_at: format_ts_iso(meta.uploaded_at),
    })
}
