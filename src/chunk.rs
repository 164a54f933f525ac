//! Boundary-seeking text chunker.
//!
//! Splits extracted text blocks into overlapping segments of at most
//! `chunk_size` characters. Cut points prefer paragraph boundaries, then
//! sentence boundaries, then whitespace, falling back to a hard cut, so
//! chunks stay semantically coherent where the text allows it. The
//! trailing `chunk_overlap` characters of each chunk are repeated at the
//! head of the next to preserve context across cuts.
//!
//! Each ingestion call mints one document id and stamps every resulting
//! chunk with the full denormalized document metadata.

use uuid::Uuid;

use crate::extract::ExtractError;
use crate::models::{join_tags, ChunkRecord};

/// Document-level metadata stamped onto every chunk at ingestion.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_at: i64,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// Split one text into overlapping pieces of at most `chunk_size` chars.
///
/// Counting is in characters, not bytes. Consecutive pieces share exactly
/// `chunk_overlap` characters (the final piece may be shorter). Pieces
/// that are entirely whitespace are dropped.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if hard_end < chars.len() {
            // Only accept a boundary in the back half of the window, and
            // never so early that the next window would not advance.
            let min_end = start + (chunk_size / 2).max(chunk_overlap + 1);
            seek_boundary(&chars, min_end.min(hard_end), hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            pieces.push(piece);
        }

        if end == chars.len() {
            break;
        }
        start = end - chunk_overlap;
    }

    pieces
}

/// Find the best cut point in `(min_end, hard_end]`, scanning backwards:
/// paragraph break, then sentence end, then any whitespace, else the hard
/// cut itself.
fn seek_boundary(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    // Paragraph: cut just after a blank line.
    for i in (min_end..=hard_end).rev() {
        if i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n' {
            return i;
        }
    }
    // Sentence: cut between closing punctuation and following whitespace.
    for i in (min_end..=hard_end).rev() {
        if i >= 1
            && matches!(chars[i - 1], '.' | '!' | '?')
            && chars.get(i).map(|c| c.is_whitespace()).unwrap_or(true)
        {
            return i;
        }
    }
    // Whitespace: cut after any space.
    for i in (min_end..=hard_end).rev() {
        if i >= 1 && chars[i - 1].is_whitespace() {
            return i;
        }
    }
    hard_end
}

/// Chunk the extractor's blocks and stamp each piece with document
/// metadata. Mints a fresh document id; fails when no block yields a
/// non-empty chunk.
pub fn build_chunks(
    blocks: &[String],
    meta: &DocumentMeta,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<ChunkRecord>, ExtractError> {
    let mut texts = Vec::new();
    for block in blocks {
        texts.extend(split_text(block, chunk_size, chunk_overlap));
    }

    if texts.is_empty() {
        return Err(ExtractError::EmptyContent(
            "document produced no text chunks".to_string(),
        ));
    }

    let document_id = Uuid::new_v4().to_string();
    let total = texts.len() as i64;
    let tags = join_tags(&meta.tags);

    let chunks = texts
        .into_iter()
        .enumerate()
        .map(|(i, content)| ChunkRecord {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.clone(),
            chunk_index: i as i64,
            total_chunks: total,
            content,
            filename: meta.filename.clone(),
            file_type: meta.file_type.clone(),
            file_size: meta.file_size,
            uploaded_at: meta.uploaded_at,
            tags: tags.clone(),
            description: meta.description.clone(),
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            filename: "test.txt".to_string(),
            file_type: ".txt".to_string(),
            file_size: 100,
            uploaded_at: 1_700_000_000,
            tags: vec!["alpha".to_string(), "beta".to_string()],
            description: Some("a test".to_string()),
        }
    }

    #[test]
    fn small_text_single_chunk() {
        let pieces = split_text("Hello, world!", 1000, 200);
        assert_eq!(pieces, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(split_text("", 1000, 200).is_empty());
        assert!(split_text("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn every_chunk_within_size() {
        let text = "word ".repeat(500);
        for piece in split_text(&text, 100, 20) {
            assert!(piece.chars().count() <= 100, "oversized: {}", piece.len());
        }
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        // No natural boundaries: pure windowing.
        let text: String = "abcdefghij".repeat(250); // 2500 chars
        let pieces = split_text(&text, 1000, 200);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].chars().count(), 1000);
        assert_eq!(pieces[1].chars().count(), 1000);
        assert_eq!(pieces[2].chars().count(), 900);
        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 200).collect();
            let head: String = pair[1].chars().take(200).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(700), "b".repeat(700));
        let pieces = split_text(&text, 1000, 100);
        // Cut lands after the blank line, not mid-way through the b-run.
        assert!(pieces[0].trim_end().ends_with('a'));
    }

    #[test]
    fn prefers_sentence_boundary_over_hard_cut() {
        let text = format!("{}. {}", "a".repeat(800), "b".repeat(800));
        let pieces = split_text(&text, 1000, 100);
        assert!(pieces[0].ends_with("a."));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "áéíóú ".repeat(400);
        let pieces = split_text(&text, 100, 20);
        assert!(!pieces.is_empty());
        for piece in pieces {
            assert!(piece.chars().count() <= 100);
        }
    }

    #[test]
    fn build_chunks_stamps_metadata() {
        let blocks = vec!["abcdefghij".repeat(250)];
        let chunks = build_chunks(&blocks, &meta(), 1000, 200).unwrap();
        assert_eq!(chunks.len(), 3);
        let doc_id = &chunks[0].document_id;
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(&c.document_id, doc_id);
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.total_chunks, 3);
            assert_eq!(c.filename, "test.txt");
            assert_eq!(c.file_type, ".txt");
            assert_eq!(c.tags, "alpha,beta");
            assert_eq!(c.description.as_deref(), Some("a test"));
            assert_eq!(c.uploaded_at, 1_700_000_000);
        }
    }

    #[test]
    fn build_chunks_indices_dense_across_blocks() {
        let blocks = vec!["first page text".to_string(), "second page text".to_string()];
        let chunks = build_chunks(&blocks, &meta(), 1000, 200).unwrap();
        assert_eq!(chunks.len(), 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn empty_document_is_content_error() {
        let blocks = vec!["   ".to_string(), "".to_string()];
        let err = build_chunks(&blocks, &meta(), 1000, 200).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyContent(_)));
    }

    #[test]
    fn fresh_document_id_per_call() {
        let blocks = vec!["same content".to_string()];
        let a = build_chunks(&blocks, &meta(), 1000, 200).unwrap();
        let b = build_chunks(&blocks, &meta(), 1000, 200).unwrap();
        assert_ne!(a[0].document_id, b[0].document_id);
    }
}
