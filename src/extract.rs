//! Multi-format text extraction for uploaded documents.
//!
//! Dispatches on the filename extension (case-insensitive) against the
//! upload allow-list and returns an ordered sequence of plain-text blocks:
//! one per PDF page, one per spreadsheet sheet, a single block for plain
//! text and EPUB.

use std::io::Read;

use crate::validate::{file_extension, ALLOWED_EXTENSIONS};

/// Maximum decompressed bytes to read from a single EPUB entry
/// (zip-bomb protection).
const MAX_EPUB_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. Unsupported formats and unreadable files are
/// distinguished so the HTTP layer can map them to different responses.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Unreadable(String),
    EmptyContent(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(ext) => write!(
                f,
                "unsupported format: {}. Allowed formats: {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            ),
            ExtractError::Unreadable(detail) => write!(f, "file unreadable: {}", detail),
            ExtractError::EmptyContent(detail) => write!(f, "no extractable text: {}", detail),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract plain-text blocks from raw file bytes, dispatching on the
/// declared filename's extension.
pub fn extract_blocks(bytes: &[u8], filename: &str) -> Result<Vec<String>, ExtractError> {
    let ext = file_extension(filename)
        .ok_or_else(|| ExtractError::UnsupportedFormat("(none)".to_string()))?;

    match ext.as_str() {
        ".pdf" => extract_pdf(bytes),
        ".txt" | ".md" => extract_plain(bytes),
        ".epub" => extract_epub(bytes),
        ".xlsx" | ".xls" => extract_spreadsheet(bytes),
        other => Err(ExtractError::UnsupportedFormat(other.to_string())),
    }
}

/// One block per page, order preserved.
fn extract_pdf(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Unreadable(e.to_string()))?;
    Ok(pages)
}

/// The whole file as one block.
fn extract_plain(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    Ok(vec![String::from_utf8_lossy(bytes).into_owned()])
}

/// Iterate the book's document-type items in archive order, strip markup,
/// and concatenate non-empty chapters into a single block.
fn extract_epub(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    let mut chapters: Vec<String> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => return Err(ExtractError::Unreadable(e.to_string())),
        };
        let name = entry.name().to_lowercase();
        if !(name.ends_with(".xhtml") || name.ends_with(".html") || name.ends_with(".htm")) {
            continue;
        }

        let mut xml = Vec::new();
        if entry
            .take(MAX_EPUB_ENTRY_BYTES)
            .read_to_end(&mut xml)
            .is_err()
        {
            continue;
        }

        // A single malformed chapter is skipped; the book only fails if
        // nothing at all yields text.
        if let Some(text) = strip_markup(&xml) {
            let text = text.trim().to_string();
            if !text.is_empty() {
                chapters.push(text);
            }
        }
    }

    if chapters.is_empty() {
        return Err(ExtractError::EmptyContent(
            "EPUB contains no readable chapters".to_string(),
        ));
    }

    Ok(vec![chapters.join("\n\n")])
}

/// Collect the text events of an XHTML document, dropping all markup.
/// Returns `None` when the document cannot be parsed at all.
fn strip_markup(xml: &[u8]) -> Option<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Text(te)) => {
                let text = te.unescape().unwrap_or_default();
                let text = text.trim();
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(text);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return if out.is_empty() { None } else { Some(out) },
            _ => {}
        }
        buf.clear();
    }
    Some(out)
}

/// One block per non-empty sheet; cells joined with spaces, rows with
/// newlines. Workbook parsing (xlsx and legacy xls) is delegated to
/// calamine's auto-detection.
fn extract_spreadsheet(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    use calamine::{open_workbook_auto_from_rs, Data, Reader};

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut blocks = Vec::new();
    for name in sheet_names {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(_) => continue,
        };

        let mut lines = Vec::new();
        for row in range.rows() {
            let cells: Vec<String> = row
                .iter()
                .filter(|cell| !matches!(cell, Data::Empty))
                .map(|cell| cell.to_string())
                .filter(|s| !s.trim().is_empty())
                .collect();
            if !cells.is_empty() {
                lines.push(cells.join(" "));
            }
        }

        if !lines.is_empty() {
            blocks.push(lines.join("\n"));
        }
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unsupported_extension_names_allowed_set() {
        let err = extract_blocks(b"MZ", "setup.exe").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
        let msg = err.to_string();
        assert!(msg.contains(".pdf") && msg.contains(".epub") && msg.contains(".xls"));
    }

    #[test]
    fn missing_extension_is_unsupported() {
        let err = extract_blocks(b"hello", "README").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn plain_text_is_single_block() {
        let blocks = extract_blocks("hello\n\nworld".as_bytes(), "notes.txt").unwrap();
        assert_eq!(blocks, vec!["hello\n\nworld".to_string()]);

        let blocks = extract_blocks("# Title".as_bytes(), "README.MD").unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn invalid_pdf_is_unreadable() {
        let err = extract_blocks(b"not a pdf", "doc.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn invalid_epub_is_unreadable() {
        let err = extract_blocks(b"not a zip archive", "book.epub").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    fn epub_with_chapters(chapters: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("mimetype", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"application/epub+zip").unwrap();
            for (name, body) in chapters {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                let xml = format!(
                    "<?xml version=\"1.0\"?><html><body><p>{}</p></body></html>",
                    body
                );
                zip.write_all(xml.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn epub_chapters_join_in_archive_order() {
        let bytes = epub_with_chapters(&[
            ("OEBPS/ch1.xhtml", "First chapter text."),
            ("OEBPS/ch2.xhtml", "Second chapter text."),
        ]);
        let blocks = extract_blocks(&bytes, "book.epub").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], "First chapter text.\n\nSecond chapter text.");
    }

    #[test]
    fn epub_without_text_is_content_error() {
        let bytes = epub_with_chapters(&[("OEBPS/ch1.xhtml", "")]);
        let err = extract_blocks(&bytes, "book.epub").unwrap_err();
        assert!(matches!(err, ExtractError::EmptyContent(_)));
    }

    #[test]
    fn invalid_spreadsheet_is_unreadable() {
        let err = extract_blocks(b"not a workbook", "sheet.xlsx").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }
}
