//! `docchat inspect`: run the segmenter alone and report what it produced.
//!
//! No embedding and no network calls, so this is safe for checking how a
//! set of documents will be chunked before uploading them.

use anyhow::Result;
use docchat_core::chunk::Segmenter;
use docchat_core::models::{Chunk, Document};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::extract::DocumentExtractor;
use crate::upload::load_documents;

/// Per-document outcome of segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    Indexed {
        document: String,
        pages: usize,
        chunks: usize,
        chars: usize,
    },
    Skipped {
        document: String,
        reason: String,
    },
}

pub fn inspect_documents(segmenter: &Segmenter, docs: &[Document]) -> Vec<Inspection> {
    docs.iter()
        .map(|doc| match segmenter.segment_document(doc) {
            Ok(chunks) => Inspection::Indexed {
                document: doc.name.clone(),
                pages: distinct_pages(&chunks),
                chunks: chunks.len(),
                chars: chunks.iter().map(|c| c.fresh_text().chars().count()).sum(),
            },
            Err(e) => Inspection::Skipped {
                document: e.document().to_string(),
                reason: e.to_string(),
            },
        })
        .collect()
}

fn distinct_pages(chunks: &[Chunk]) -> usize {
    chunks.iter().map(|c| c.page).collect::<BTreeSet<_>>().len()
}

pub fn run_inspect(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let segmenter = Segmenter::new(Arc::new(DocumentExtractor), config.chunking.params()?);
    let docs = load_documents(paths)?;
    if docs.is_empty() {
        println!("No .pdf, .txt or .md files found.");
        return Ok(());
    }

    let report = inspect_documents(&segmenter, &docs);
    let mut total_chunks = 0;
    let mut skipped = 0;

    for item in &report {
        match item {
            Inspection::Indexed {
                document,
                pages,
                chunks,
                chars,
            } => {
                total_chunks += chunks;
                println!(
                    "{}: {} chunks from {} pages with text ({} chars)",
                    document, chunks, pages, chars
                );
            }
            Inspection::Skipped { reason, .. } => {
                skipped += 1;
                println!("skipped {}", reason);
            }
        }
    }

    println!(
        "\n{} documents, {} chunks, {} skipped (max_chars={}, overlap_chars={})",
        report.len() - skipped,
        total_chunks,
        skipped,
        segmenter.params().max_chars(),
        segmenter.params().overlap_chars(),
    );
    Ok(())
}
