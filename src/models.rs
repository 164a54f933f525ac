//! Core data models used throughout docqa.
//!
//! These types represent the chunks, synthesized document records, and
//! search results that flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// A chunk of a document's extracted text — the unit of storage and
/// retrieval in the vector index.
///
/// A "document" has no storage record of its own; it exists only as the
/// aggregate of its chunks' shared metadata fields. Every chunk therefore
/// carries a full denormalized copy of its parent's metadata.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub content: String,
    pub filename: String,
    /// Lowercase extension including the dot, e.g. `".pdf"`.
    pub file_type: String,
    pub file_size: i64,
    /// Ingestion timestamp, epoch seconds.
    pub uploaded_at: i64,
    /// Comma-joined tag list (the storage-native scalar form).
    pub tags: String,
    pub description: Option<String>,
}

impl ChunkRecord {
    /// Tags as a list, splitting the storage form.
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

/// Split the comma-joined storage form back into a tag list.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join a tag list into the comma-joined storage form.
pub fn join_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// A document record synthesized by grouping chunks on `document_id`.
///
/// Shared fields come from the first-seen chunk of the group;
/// `chunk_count` is the number of chunks seen.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub filename: String,
    /// ISO 8601 upload timestamp.
    pub uploaded_at: String,
    pub file_size_bytes: i64,
    pub chunk_count: i64,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub file_type: String,
}

/// A chunk paired with its similarity score, as returned by the index.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    /// Raw cosine similarity in `[-1, 1]`.
    pub score: f64,
}

/// Render an epoch-seconds timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_roundtrip() {
        let tags = vec!["manual".to_string(), "v2".to_string()];
        let joined = join_tags(&tags);
        assert_eq!(joined, "manual,v2");
        assert_eq!(split_tags(&joined), tags);
    }

    #[test]
    fn split_tags_ignores_blanks() {
        assert_eq!(split_tags(" a , ,b,"), vec!["a", "b"]);
        assert!(split_tags("").is_empty());
    }
}
