//! Upload and query validation.
//!
//! All checks run before any extraction, embedding, or storage work, so a
//! rejected request has no side effects.

/// Extensions accepted for upload (lowercase, with dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".md", ".epub", ".xlsx", ".xls"];

/// Maximum length of a filename stem after sanitization.
const MAX_STEM_CHARS: usize = 200;

/// Validation failure, detected before any processing.
#[derive(Debug)]
pub enum ValidationError {
    EmptyFilename,
    InvalidFilename,
    MissingExtension,
    UnsupportedFormat(String),
    FileTooSmall { size: u64, min: u64 },
    FileTooLarge { size: u64, max: u64 },
    QueryEmpty,
    QueryTooShort { len: usize, min: usize },
    QueryTooLong { len: usize, max: usize },
    NoUpdateFields,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyFilename => write!(f, "filename must not be empty"),
            ValidationError::InvalidFilename => write!(f, "filename is not valid"),
            ValidationError::MissingExtension => {
                write!(f, "file must have an extension")
            }
            ValidationError::UnsupportedFormat(ext) => write!(
                f,
                "unsupported format: {}. Allowed formats: {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            ),
            ValidationError::FileTooSmall { size, min } => write!(
                f,
                "file is empty or too small ({} bytes, minimum: {} bytes)",
                size, min
            ),
            ValidationError::FileTooLarge { size, max } => write!(
                f,
                "file too large ({:.2} MB, maximum: {:.2} MB)",
                *size as f64 / (1024.0 * 1024.0),
                *max as f64 / (1024.0 * 1024.0)
            ),
            ValidationError::QueryEmpty => write!(f, "query must not be empty"),
            ValidationError::QueryTooShort { len, min } => {
                write!(f, "query too short ({} chars, minimum: {})", len, min)
            }
            ValidationError::QueryTooLong { len, max } => {
                write!(f, "query too long ({} chars, maximum: {})", len, max)
            }
            ValidationError::NoUpdateFields => {
                write!(f, "no fields provided to update")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Replace dangerous characters with `_`, collapse whitespace runs, and
/// cap the stem length.
pub fn sanitize_filename(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len());
    let mut in_whitespace = false;
    for c in filename.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => out.push('_'),
            c if (c as u32) < 0x20 => out.push('_'),
            c => out.push(c),
        }
    }

    let (stem, ext) = split_extension(&out);
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    match ext {
        Some(ext) => format!("{}{}", stem, ext),
        None => stem,
    }
}

/// Split `name.ext` into (`name`, `Some(".ext")`); no dot means no extension.
fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(0) | None => (filename, None),
        Some(pos) => (&filename[..pos], Some(&filename[pos..])),
    }
}

/// The lowercase extension (with dot) of a filename, if it has one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = split_extension(filename);
    ext.filter(|e| e.len() > 1).map(|e| e.to_lowercase())
}

/// Validate and sanitize an uploaded filename.
pub fn validate_filename(filename: &str) -> Result<String, ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    let safe = sanitize_filename(filename);
    if safe.is_empty() || safe == "." || safe.chars().all(|c| c == '_' || c == '.') {
        return Err(ValidationError::InvalidFilename);
    }
    Ok(safe)
}

/// Validate the extension against the allow-list; returns it lowercase.
pub fn validate_extension(filename: &str) -> Result<String, ValidationError> {
    let ext = file_extension(filename).ok_or(ValidationError::MissingExtension)?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::UnsupportedFormat(ext));
    }
    Ok(ext)
}

/// Validate the upload size against configured bounds.
pub fn validate_file_size(size: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if size < min {
        return Err(ValidationError::FileTooSmall { size, min });
    }
    if size > max {
        return Err(ValidationError::FileTooLarge { size, max });
    }
    Ok(())
}

/// Validate a query string; returns the trimmed text.
pub fn validate_query(query: &str, min: usize, max: usize) -> Result<String, ValidationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::QueryEmpty);
    }
    let len = trimmed.chars().count();
    if len < min {
        return Err(ValidationError::QueryTooShort { len, min });
    }
    if len > max {
        return Err(ValidationError::QueryTooLong { len, max });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_dangerous_chars() {
        assert_eq!(sanitize_filename("a<b>c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("my report.pdf"), "my_report.pdf");
        assert_eq!(sanitize_filename("a  \t b.md"), "a_b.md");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn sanitize_caps_stem_length() {
        let long = format!("{}.txt", "x".repeat(500));
        let safe = sanitize_filename(&long);
        assert_eq!(safe.chars().count(), 200 + 4);
        assert!(safe.ends_with(".txt"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file_extension("Report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(file_extension("notes"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn disallowed_extension_names_allowed_set() {
        let err = validate_extension("virus.exe").unwrap_err();
        let msg = err.to_string();
        for ext in ALLOWED_EXTENSIONS {
            assert!(msg.contains(ext), "missing {} in: {}", ext, msg);
        }
    }

    #[test]
    fn allowed_extensions_pass() {
        for ext in ALLOWED_EXTENSIONS {
            let name = format!("file{}", ext);
            assert_eq!(validate_extension(&name).unwrap(), *ext);
        }
    }

    #[test]
    fn size_bounds() {
        assert!(validate_file_size(5, 10, 100).is_err());
        assert!(validate_file_size(500, 10, 100).is_err());
        assert!(validate_file_size(50, 10, 100).is_ok());
    }

    #[test]
    fn query_length_bounds() {
        assert!(matches!(
            validate_query("ab", 3, 1000),
            Err(ValidationError::QueryTooShort { len: 2, min: 3 })
        ));
        assert!(matches!(
            validate_query("   ", 3, 1000),
            Err(ValidationError::QueryEmpty)
        ));
        let long = "q".repeat(1001);
        assert!(matches!(
            validate_query(&long, 3, 1000),
            Err(ValidationError::QueryTooLong { .. })
        ));
        assert_eq!(validate_query("  what is this?  ", 3, 1000).unwrap(), "what is this?");
    }
}
