pub mod chunker;
pub mod reader_docx;
pub mod reader_html;
pub mod reader_txt;
#[cfg(feature = "pure-pdf")]
pub mod reader_pdf;

use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// Errors produced while turning a file into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported format: {0}")]
    Unsupported(String),
    #[error("extraction failed for {path}: {reason}")]
    Failed { path: String, reason: String },
}

/// Turns a file path into UTF-8 text, or reports that the format is
/// unsupported or the extraction failed. Implementations are interchangeable;
/// the indexer treats any error as a per-file skip.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Extension-dispatching extractor covering the built-in formats.
#[derive(Debug, Clone)]
pub struct DefaultExtractor {
    /// Pages read from a PDF before the rest is ignored.
    pub max_pdf_pages: usize,
    /// Recognized for OCR-capable extractors; the built-in readers do not OCR.
    pub ocr_enabled: bool,
}

impl Default for DefaultExtractor {
    fn default() -> Self {
        Self { max_pdf_pages: 50, ocr_enabled: false }
    }
}

impl Extractor for DefaultExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        debug!(path = %path.display(), ext = %ext, "extracting");
        match ext.as_str() {
            "txt" | "md" | "markdown" | "rtf" | "text" | "log" => reader_txt::read_text(path),
            "html" | "htm" => reader_html::read_html(path),
            "docx" => reader_docx::read_docx(path),
            #[cfg(feature = "pure-pdf")]
            "pdf" => reader_pdf::read_pdf(path, self.max_pdf_pages),
            #[cfg(not(feature = "pure-pdf"))]
            "pdf" => Err(ExtractError::Unsupported(
                "pdf support requires the `pure-pdf` feature".into(),
            )),
            // Unknown extensions are tried as plain text, matching the
            // indexer's permissive allow-list behavior.
            _ => reader_txt::read_text(path),
        }
    }
}

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> ExtractError {
    ExtractError::Io { path: path.display().to_string(), source }
}

pub(crate) fn failed(path: &Path, reason: impl Into<String>) -> ExtractError {
    ExtractError::Failed { path: path.display().to_string(), reason: reason.into() }
}
