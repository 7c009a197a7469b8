//! Text extraction from uploaded study material.
//!
//! Supports plain text and PDF. The result is capped at
//! [`MAX_CONTENT_CHARS`] characters before it reaches the prompt.

use thiserror::Error;

use crate::config::MAX_CONTENT_CHARS;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(
        "Unsupported file '{filename}' (content-type: '{content_type}'). \
         Only .pdf and .txt files are accepted."
    )]
    Unsupported {
        filename: String,
        content_type: String,
    },
    #[error("File is empty.")]
    Empty,
    #[error("Could not parse PDF: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileKind {
    Pdf,
    Txt,
}

/// Resolves the declared kind: filename extension first, MIME type second.
fn resolve_kind(filename: &str, content_type: &str) -> Option<FileKind> {
    let filename = filename.to_lowercase();
    let content_type = content_type.to_lowercase();

    if filename.ends_with(".pdf") || content_type == "application/pdf" {
        Some(FileKind::Pdf)
    } else if filename.ends_with(".txt") || content_type.starts_with("text/") {
        Some(FileKind::Txt)
    } else {
        None
    }
}

/// Extracts plain text from the raw bytes of a PDF or TXT upload.
pub fn extract_text(
    raw: &[u8],
    filename: &str,
    content_type: &str,
) -> Result<String, ExtractError> {
    let kind = resolve_kind(filename, content_type).ok_or_else(|| ExtractError::Unsupported {
        filename: filename.to_string(),
        content_type: content_type.to_string(),
    })?;

    if raw.is_empty() {
        return Err(ExtractError::Empty);
    }

    let text = match kind {
        FileKind::Txt => String::from_utf8_lossy(raw).into_owned(),
        FileKind::Pdf => pdf_extract::extract_text_from_mem(raw)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?,
    };

    Ok(text.chars().take(MAX_CONTENT_CHARS).collect())
}
