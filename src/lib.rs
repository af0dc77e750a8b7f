//! # docchat
//!
//! Chat with your documents. Upload PDFs or text files, ask questions, and
//! get answers grounded in the passages that match. When nothing in the
//! uploaded documents is relevant enough the assistant answers from general
//! knowledge instead.
//!
//! The retrieval core (segmenter, similarity index, retrieval gate, prompt
//! composition, backend selection) lives in the `docchat-core` crate. This
//! crate supplies the I/O around it: PDF extraction, embedding providers,
//! language-model backends, the session, the SQLite turn log, the CLI and
//! the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌──────────────┐
//! │  Upload   │──▶│ Segmenter  │──▶│ LiveIndex    │
//! │ PDF/TXT/MD│   │ + Embedder │   │ (in memory)  │
//! └───────────┘   └────────────┘   └──────┬───────┘
//!                                         │
//!          query ──▶ RetrievalGate ◀──────┘
//!                         │
//!                         ▼
//!              ┌─────────────────────┐     ┌──────────┐
//!              │ Gemini / HuggingFace│────▶│ Turn log │
//!              └─────────────────────┘     │ (SQLite) │
//!                                          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`extract`] | PDF and plain-text page extraction |
//! | [`upload`] | Expanding paths into documents |
//! | [`embedding`] | Embedding providers |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`backend`] | Gemini and Hugging Face language-model backends |
//! | [`chat`] | One chat turn with timeout |
//! | [`session`] | Session state: index, history, private mode |
//! | [`history`] | Long-term turn log |
//! | [`export`] | JSON and Markdown export of the turn log |
//! | [`inspect`] | Segmenter-only dry run |
//! | [`repl`] | Interactive chat and one-shot questions |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backend;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod export;
pub mod extract;
pub mod history;
pub mod http;
pub mod inspect;
pub mod migrate;
pub mod repl;
pub mod server;
pub mod session;
pub mod upload;
