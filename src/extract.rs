//! Page-level text extraction for uploaded documents.
//!
//! PDFs are detected by their `%PDF-` magic bytes or a `.pdf` name and are
//! extracted page by page with `pdf-extract`. Plain text (`.txt`, `.md`)
//! is treated as a single page. Anything else is reported as unreadable so
//! the segmenter can skip it and keep going with the rest of the batch.

use std::panic::{self, AssertUnwindSafe};

use docchat_core::chunk::PageExtractor;
use docchat_core::error::SegmentationError;
use docchat_core::models::Document;

/// File extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Document kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

/// Classify a document by content first, then by name.
pub fn detect_kind(doc: &Document) -> Option<DocumentKind> {
    if doc.bytes.starts_with(PDF_MAGIC) {
        return Some(DocumentKind::Pdf);
    }
    match extension(&doc.name).as_deref() {
        Some("pdf") => Some(DocumentKind::Pdf),
        Some("txt") | Some("md") => Some(DocumentKind::Text),
        _ => None,
    }
}

/// Lower-cased extension of a file name, if any.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// The extractor used by the application's segmenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl PageExtractor for DocumentExtractor {
    fn extract_pages(&self, doc: &Document) -> Result<Vec<String>, SegmentationError> {
        match detect_kind(doc) {
            Some(DocumentKind::Pdf) => extract_pdf_pages(doc),
            Some(DocumentKind::Text) => extract_text(doc),
            None => Err(SegmentationError::Unreadable {
                document: doc.name.clone(),
                reason: format!(
                    "unsupported file type (expected one of: {})",
                    SUPPORTED_EXTENSIONS.join(", ")
                ),
            }),
        }
    }
}

fn extract_pdf_pages(doc: &Document) -> Result<Vec<String>, SegmentationError> {
    let unreadable = |reason: String| SegmentationError::Unreadable {
        document: doc.name.clone(),
        reason,
    };

    // pdf-extract panics on some malformed inputs.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&doc.bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(unreadable(format!("PDF extraction failed: {}", e))),
        Err(_) => Err(unreadable("PDF parser panicked".to_string())),
    }
}

fn extract_text(doc: &Document) -> Result<Vec<String>, SegmentationError> {
    let text = std::str::from_utf8(&doc.bytes).map_err(|e| SegmentationError::Unreadable {
        document: doc.name.clone(),
        reason: format!("not valid UTF-8: {}", e),
    })?;
    Ok(vec![text.to_string()])
}
