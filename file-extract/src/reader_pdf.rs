//! Pure-Rust PDF text extraction via `lopdf`. Behind feature `pure-pdf`.

#![cfg(feature = "pure-pdf")]

use std::path::Path;

use lopdf::Document;
use tracing::debug;

use crate::{failed, ExtractError};

/// Extract text from up to `max_pages` pages, joined with blank lines.
/// Pages whose content streams cannot be decoded are skipped; the file only
/// fails when no page yields any text.
pub fn read_pdf(path: &Path, max_pages: usize) -> Result<String, ExtractError> {
    let doc = Document::load(path).map_err(|e| failed(path, format!("cannot load pdf: {e}")))?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().take(max_pages).collect();
    if pages.is_empty() {
        return Err(failed(path, "pdf has no pages"));
    }

    let mut parts: Vec<String> = Vec::with_capacity(pages.len());
    for page in &pages {
        match doc.extract_text(&[*page]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Err(e) => {
                debug!(path = %path.display(), page, error = %e, "page text extraction failed");
            }
        }
    }

    if parts.is_empty() {
        return Err(failed(path, "no extractable text in pdf"));
    }
    Ok(parts.join("\n\n"))
}
