//! Document segmenter: overlapping, page-scoped text chunks.
//!
//! Each page of extracted text is an independent stream. A page is cut into
//! windows of at most `max_chars` characters; every window after the first
//! starts `overlap_chars` characters before the previous window ended, so
//! text near a boundary appears in both chunks.
//!
//! # Algorithm
//!
//! 1. Extract pages through the injected [`PageExtractor`].
//! 2. Skip pages that are empty or whitespace only.
//! 3. For each window `[start, start + max_chars)`, look backwards for a
//!    whitespace split point in the second half of the window; without one,
//!    cut hard at `max_chars`.
//! 4. The next window starts at `end - overlap_chars`.
//! 5. Record page, document-wide index, character offset, overlap length and
//!    a SHA-256 content hash on every chunk.
//!
//! Chunk text is an exact substring of the page (nothing is trimmed), so the
//! first chunk of a page followed by every later chunk's
//! [`fresh_text`](crate::models::Chunk::fresh_text) rebuilds the page.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::{chunk_pages, ChunkParams};
//!
//! let params = ChunkParams::new(1000, 200).unwrap();
//! let pages = vec!["First page.".to_string(), "Second page.".to_string()];
//! let chunks = chunk_pages("guide.pdf", &pages, params);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].page, 2);
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SegmentationError;
use crate::models::{Chunk, Document};

/// Chunk size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_chars: usize,
    overlap_chars: usize,
}

impl ChunkParams {
    /// Validates `max_chars > 0` and `overlap_chars < max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            bail!("max_chars must be > 0");
        }
        if overlap_chars >= max_chars {
            bail!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                overlap_chars,
                max_chars
            );
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }
}

/// One window of a page, before it is tagged with document metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Character offset within the page.
    pub start: usize,
    /// Leading characters shared with the previous span.
    pub overlap: usize,
    pub text: String,
}

/// Split one page of text into overlapping spans.
///
/// Returns nothing for empty or whitespace-only text.
pub fn split_text(text: &str, params: ChunkParams) -> Vec<TextSpan> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    // Byte offset of every char, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();
    let max = params.max_chars;
    let overlap = params.overlap_chars;

    let mut spans = Vec::new();
    let mut start = 0;
    let mut lead = 0;

    loop {
        let hard_end = (start + max).min(total);
        let end = if hard_end == total {
            total
        } else {
            split_point(&chars, start, hard_end, overlap, max)
        };

        spans.push(TextSpan {
            start,
            overlap: lead,
            text: text[offsets[start]..offsets[end]].to_string(),
        });

        if end == total {
            break;
        }
        start = end - overlap;
        lead = overlap;
    }

    spans
}

/// Latest whitespace boundary in the second half of the window, or the hard
/// limit. Always leaves `end - start > overlap` so the next window advances.
fn split_point(chars: &[char], start: usize, hard_end: usize, overlap: usize, max: usize) -> usize {
    let lower = (start + overlap + 1).max(start + max / 2);
    (lower..=hard_end)
        .rev()
        .find(|&end| chars[end - 1].is_whitespace())
        .unwrap_or(hard_end)
}

/// Chunk already-extracted pages of one document.
///
/// Chunk indices run contiguously across pages; overlap never crosses a
/// page boundary.
pub fn chunk_pages(source: &str, pages: &[String], params: ChunkParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        for span in split_text(page, params) {
            let index = chunks.len();
            chunks.push(make_chunk(source, page_idx + 1, index, span));
        }
    }
    chunks
}

/// Create a [`Chunk`] with its id and SHA-256 content hash.
fn make_chunk(source: &str, page: usize, index: usize, span: TextSpan) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}:p{}:c{}", source, page, index),
        source: source.to_string(),
        page,
        chunk_index: index,
        start: span.start,
        overlap: span.overlap,
        text: span.text,
        hash,
    }
}

/// Turns document bytes into per-page text.
///
/// Implementations must not panic on malformed input; they report
/// [`SegmentationError::Unreadable`] instead.
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, doc: &Document) -> Result<Vec<String>, SegmentationError>;
}

/// Chunks produced for one upload batch, plus the documents that were skipped.
#[derive(Debug, Default)]
pub struct SegmentOutput {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SegmentationError>,
    /// Number of documents that contributed at least one chunk.
    pub documents_indexed: usize,
}

/// Splits uploaded documents into chunks.
#[derive(Clone)]
pub struct Segmenter {
    extractor: Arc<dyn PageExtractor>,
    params: ChunkParams,
}

impl Segmenter {
    pub fn new(extractor: Arc<dyn PageExtractor>, params: ChunkParams) -> Self {
        Self { extractor, params }
    }

    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Chunk a single document.
    pub fn segment_document(&self, doc: &Document) -> Result<Vec<Chunk>, SegmentationError> {
        let pages = self.extractor.extract_pages(doc)?;
        let chunks = chunk_pages(&doc.name, &pages, self.params);
        if chunks.is_empty() {
            return Err(SegmentationError::NoText {
                document: doc.name.clone(),
            });
        }
        debug!(
            document = %doc.name,
            pages = pages.len(),
            chunks = chunks.len(),
            "segmented document"
        );
        Ok(chunks)
    }

    /// Chunk a batch. A document that fails is logged and skipped; the rest
    /// of the batch is still processed. Chunk indices restart at 0 for each
    /// document, and ids carry the document's position in the batch so two
    /// documents with the same name never share an id.
    pub fn segment(&self, docs: &[Document]) -> SegmentOutput {
        let mut out = SegmentOutput::default();
        for (position, doc) in docs.iter().enumerate() {
            match self.segment_document(doc) {
                Ok(chunks) => {
                    out.documents_indexed += 1;
                    out.chunks.extend(chunks.into_iter().map(|mut c| {
                        c.id = format!("d{}/{}", position, c.id);
                        c
                    }));
                }
                Err(e) => {
                    warn!(document = %doc.name, error = %e, "skipping document");
                    out.skipped.push(e);
                }
            }
        }
        out
    }
}
