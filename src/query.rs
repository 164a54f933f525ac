//! Question answering over the index.
//!
//! Validates the question, embeds it, retrieves the top-k chunks, and
//! hands them to the answer generator. Returns `None` when nothing
//! relevant is indexed — a distinct outcome from an error.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::embedding::CachedEmbedder;
use crate::llm::AnswerGenerator;
use crate::models::SearchHit;
use crate::store::VectorStore;
use crate::validate;

/// Characters of chunk content kept in a source preview.
const PREVIEW_CHARS: usize = 200;

/// A source excerpt backing an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: serde_json::Value,
    /// Relevance in `[0, 1]` (cosine similarity rescaled).
    pub relevance_score: f64,
}

/// A generated answer with its supporting sources.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
    pub model_used: String,
    pub latency_ms: f64,
}

/// Answer a question from the indexed documents.
///
/// `Ok(None)` means no relevant chunks were found. `max_results` is
/// clamped to `[1, limits.max_results]`.
pub async fn answer_question(
    config: &Config,
    store: &VectorStore,
    embedder: &CachedEmbedder,
    generator: &AnswerGenerator,
    question: &str,
    max_results: usize,
) -> Result<Option<QueryOutcome>> {
    let question = validate::validate_query(
        question,
        config.limits.min_query_chars,
        config.limits.max_query_chars,
    )?;
    let k = max_results.clamp(1, config.limits.max_results);

    tracing::info!(query = %question, k, "answering question");

    let query_vec = embedder.embed_query(&question).await?;
    let hits = store.search(&query_vec, k, &[]).await?;
    if hits.is_empty() {
        return Ok(None);
    }

    let answer = generator.generate_answer(&question, &hits).await?;

    let sources = hits.iter().map(source_from_hit).collect();
    Ok(Some(QueryOutcome {
        answer: answer.text,
        sources,
        model_used: generator.model_name().to_string(),
        latency_ms: answer.latency_ms,
    }))
}

fn source_from_hit(hit: &SearchHit) -> SourceDocument {
    SourceDocument {
        content: preview(&hit.chunk.content),
        metadata: serde_json::json!({
            "document_id": hit.chunk.document_id,
            "filename": hit.chunk.filename,
            "chunk_index": hit.chunk.chunk_index,
            "total_chunks": hit.chunk.total_chunks,
            "file_type": hit.chunk.file_type,
            "tags": hit.chunk.tag_list(),
        }),
        relevance_score: relevance(hit.score),
    }
}

/// Map raw cosine similarity in `[-1, 1]` onto `[0, 1]`.
fn relevance(score: f64) -> f64 {
    ((score + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// First [`PREVIEW_CHARS`] characters, with an ellipsis when truncated.
fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_maps_cosine_to_unit_interval() {
        assert_eq!(relevance(1.0), 1.0);
        assert_eq!(relevance(-1.0), 0.0);
        assert!((relevance(0.0) - 0.5).abs() < 1e-9);
        assert_eq!(relevance(2.0), 1.0);
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));

        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let long = "é".repeat(300);
        let p = preview(&long);
        assert!(p.starts_with('é'));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
