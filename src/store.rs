//! Chunk index over SQLite, with document-level views.
//!
//! Chunks are the only stored entity: embedding BLOBs live next to their
//! text and denormalized document metadata in a single `chunks` table,
//! and similarity is computed in-process over the candidate set (cosine,
//! descending). Document records are synthesized on demand by grouping
//! chunks on `document_id`.
//!
//! Failure handling is deliberately asymmetric: `insert` and `search`
//! propagate storage errors so callers can surface or retry them, while
//! the listing reads (`all_documents`, `document_by_id`,
//! `document_content`) log and degrade to an empty result.

use anyhow::{bail, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{format_ts_iso, join_tags, split_tags, ChunkRecord, DocumentInfo, SearchHit};

/// Metadata columns accepted as equality filters.
const FILTER_COLUMNS: &[&str] = &["document_id", "filename", "file_type", "tags"];

/// A partial metadata update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.description.is_none()
    }
}

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a document's chunks with their embedding vectors.
    ///
    /// Runs in one transaction, so a mid-insert failure leaves nothing
    /// behind; callers must still treat any failure as "unknown how many
    /// were persisted". Returns the number of chunks inserted.
    pub async fn insert(&self, chunks: &[ChunkRecord], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, chunk_index, total_chunks, content,
                     filename, file_type, file_size, uploaded_at, tags,
                     description, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(chunk.total_chunks)
            .bind(&chunk.content)
            .bind(&chunk.filename)
            .bind(&chunk.file_type)
            .bind(chunk.file_size)
            .bind(chunk.uploaded_at)
            .bind(&chunk.tags)
            .bind(&chunk.description)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(count = chunks.len(), "inserted chunks into index");
        Ok(chunks.len())
    }

    /// Top-`k` chunks by cosine similarity to `query_vec`, optionally
    /// restricted by AND-composed metadata equality filters. An empty
    /// result is not an error; storage errors propagate.
    pub async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        filters: &[(String, String)],
    ) -> Result<Vec<SearchHit>> {
        let mut sql = String::from(
            "SELECT id, document_id, chunk_index, total_chunks, content, filename, \
             file_type, file_size, uploaded_at, tags, description, embedding FROM chunks",
        );
        for (i, (field, _)) in filters.iter().enumerate() {
            if !FILTER_COLUMNS.contains(&field.as_str()) {
                bail!("unknown metadata filter field: {}", field);
            }
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(field);
            sql.push_str(" = ?");
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in filters {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                SearchHit {
                    chunk: row_to_chunk(row),
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Like [`search`](Self::search), for document-level discovery: no
    /// query vector means no candidates (the index cannot rank without
    /// one), so `None` yields an empty result rather than an error.
    pub async fn search_documents(
        &self,
        query_vec: Option<&[f32]>,
        filters: &[(String, String)],
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        match query_vec {
            Some(vec) => self.search(vec, k, filters).await,
            None => Ok(Vec::new()),
        }
    }

    /// All documents, synthesized by grouping chunk metadata. Shared
    /// fields come from each group's first chunk; listing failures
    /// degrade to an empty result.
    pub async fn all_documents(&self) -> Vec<DocumentInfo> {
        let rows = sqlx::query(
            "SELECT document_id, filename, file_type, file_size, uploaded_at, tags, description \
             FROM chunks ORDER BY uploaded_at DESC, document_id, chunk_index",
        )
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("document listing failed, returning empty: {}", e);
                return Vec::new();
            }
        };

        let mut order: Vec<String> = Vec::new();
        let mut docs: std::collections::HashMap<String, DocumentInfo> =
            std::collections::HashMap::new();
        for row in &rows {
            let id: String = row.get("document_id");
            match docs.get_mut(&id) {
                Some(doc) => doc.chunk_count += 1,
                None => {
                    order.push(id.clone());
                    docs.insert(id.clone(), row_to_document(row, 1));
                }
            }
        }

        order.into_iter().filter_map(|id| docs.remove(&id)).collect()
    }

    /// One document by id, or `None` when no chunks match (or the read
    /// fails).
    pub async fn document_by_id(&self, document_id: &str) -> Option<DocumentInfo> {
        let rows = sqlx::query(
            "SELECT document_id, filename, file_type, file_size, uploaded_at, tags, description \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(row_to_document(&rows[0], rows.len() as i64)),
            Err(e) => {
                tracing::warn!("document lookup failed for {}: {}", document_id, e);
                None
            }
        }
    }

    /// Delete every chunk of a document. Returns whether the delete ran
    /// without error; deleting an id with no chunks is not a failure.
    pub async fn delete_document(&self, document_id: &str) -> bool {
        match sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    document_id,
                    chunks = result.rows_affected(),
                    "deleted document"
                );
                true
            }
            Err(e) => {
                tracing::warn!("delete failed for {}: {}", document_id, e);
                false
            }
        }
    }

    /// Merge `updates` into the denormalized metadata of every chunk of
    /// a document. Read-modify-write per chunk, with no cross-record
    /// atomicity; a concurrent update to the same document is
    /// last-write-wins per chunk. Returns false when no chunks exist.
    pub async fn update_metadata(
        &self,
        document_id: &str,
        updates: &MetadataUpdate,
    ) -> Result<bool> {
        let rows = sqlx::query("SELECT id, tags, description FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(false);
        }

        for row in &rows {
            let chunk_id: String = row.get("id");
            let tags = match &updates.tags {
                Some(tags) => join_tags(tags),
                None => row.get("tags"),
            };
            let description: Option<String> = match &updates.description {
                Some(description) => Some(description.clone()),
                None => row.get("description"),
            };

            sqlx::query("UPDATE chunks SET tags = ?, description = ? WHERE id = ?")
                .bind(&tags)
                .bind(&description)
                .bind(&chunk_id)
                .execute(&self.pool)
                .await?;
        }

        tracing::info!(document_id, chunks = rows.len(), "updated document metadata");
        Ok(true)
    }

    /// Reconstruct a document's text: chunk contents in ascending
    /// `chunk_index` order joined with blank lines. `None` when the
    /// document has no chunks (or the read fails).
    pub async fn document_content(&self, document_id: &str) -> Option<String> {
        let rows = sqlx::query(
            "SELECT content FROM chunks WHERE document_id = ? \
             ORDER BY COALESCE(chunk_index, 0) ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => Some(
                rows.iter()
                    .map(|row| row.get::<String, _>("content"))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            Err(e) => {
                tracing::warn!("content read failed for {}: {}", document_id, e);
                None
            }
        }
    }

    /// Irreversibly remove every chunk, then re-initialize an empty
    /// index in its place.
    pub async fn delete_collection(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS chunks")
            .execute(&self.pool)
            .await?;
        migrate::create_schema(&self.pool).await?;
        tracing::info!("collection wiped and re-initialized");
        Ok(())
    }

    /// Total chunks in the index.
    pub async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_chunk(row: &SqliteRow) -> ChunkRecord {
    ChunkRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        total_chunks: row.get("total_chunks"),
        content: row.get("content"),
        filename: row.get("filename"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        uploaded_at: row.get("uploaded_at"),
        tags: row.get("tags"),
        description: row.get("description"),
    }
}

fn row_to_document(row: &SqliteRow, chunk_count: i64) -> DocumentInfo {
    let tags: String = row.get("tags");
    let uploaded_at: i64 = row.get("uploaded_at");
    DocumentInfo {
        document_id: row.get("document_id"),
        filename: row.get("filename"),
        uploaded_at: format_ts_iso(uploaded_at),
        file_size_bytes: row.get("file_size"),
        chunk_count,
        tags: split_tags(&tags),
        description: row.get("description"),
        file_type: row.get("file_type"),
    }
}
