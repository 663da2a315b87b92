use bytes::Bytes;
use thiserror::Error;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file is not a PDF")]
    NotPdf,

    #[error("PDF could not be read: {0}")]
    Unreadable(String),

    #[error("PDF contains no extractable text (scanned image?)")]
    NoText,
}

/// Extracts plain text from an uploaded PDF.
///
/// The parser runs on the blocking pool; a panic inside it is reported as
/// `Unreadable` rather than taking the request down.
pub async fn extract_text(bytes: Bytes) -> Result<String, DocumentError> {
    if !looks_like_pdf(&bytes) {
        return Err(DocumentError::NotPdf);
    }

    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| DocumentError::Unreadable(format!("parser aborted: {e}")))?
        .map_err(|e| DocumentError::Unreadable(e.to_string()))?;

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(DocumentError::NoText);
    }
    Ok(text)
}

/// Leading whitespace before the header is tolerated, as some generators emit it.
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}

/// Trims trailing spaces, drops form feeds and collapses runs of blank lines to one.
fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.replace('\u{c}', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line);
    }
    out
}

/// Returns at most `max_chars` characters of `text`.
///
/// When the text must be cut, the cut moves back to the last whitespace inside the
/// final tenth of the window so words are not split.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    let cut = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return text,
    };

    let window_floor = text
        .char_indices()
        .nth(max_chars - max_chars / 10)
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let boundary = text[window_floor..cut]
        .rfind(char::is_whitespace)
        .map(|offset| window_floor + offset)
        .unwrap_or(cut);

    text[..boundary].trim_end()
}
