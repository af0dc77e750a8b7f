//! # docchat core
//!
//! Runtime-agnostic retrieval core for docchat: data models, the document
//! segmenter, the embedding trait, the in-memory similarity index, the
//! retrieval gate, prompt composition, and language-model backend selection.
//!
//! This crate contains no tokio, HTTP, database, or filesystem code. Page
//! extraction, embedding, and generation are injected through the
//! [`chunk::PageExtractor`], [`embedding::Embedder`], and
//! [`generate::LanguageModel`] traits.
//!
//! ```text
//! Documents ──▶ Segmenter ──▶ Chunks ──▶ SimilarityIndex::build
//!                                              │
//!                                   LiveIndex (atomic swap)
//!                                              │
//! Query ──▶ RetrievalGate ──▶ GateDecision ──▶ prompt ──▶ LanguageModel
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod generate;
pub mod index;
pub mod models;
pub mod prompt;
