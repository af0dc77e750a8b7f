//! Chat session state.
//!
//! A [`ChatSession`] owns everything one conversation needs: the live
//! index for the most recent upload batch, the conversation history, the
//! private-mode flag, and an optional handle to the long-term turn log.
//! The REPL owns one directly; the HTTP server shares one behind an `Arc`.

use anyhow::Result;
use docchat_core::chunk::Segmenter;
use docchat_core::embedding::Embedder;
use docchat_core::error::{ChatError, IndexError, SegmentationError};
use docchat_core::index::{LiveIndex, SimilarityIndex};
use docchat_core::models::{Document, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chat::{Assistant, Reply};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::DocumentExtractor;
use crate::history::TurnLog;

/// Outcome of one upload batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub documents_indexed: usize,
    pub chunks: usize,
    pub skipped: Vec<SegmentationError>,
}

pub struct ChatSession {
    index: LiveIndex,
    segmenter: Segmenter,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    assistant: Assistant,
    history: Mutex<Vec<Message>>,
    private: AtomicBool,
    turn_log: Option<TurnLog>,
}

impl ChatSession {
    pub fn new(
        segmenter: Segmenter,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        assistant: Assistant,
        turn_log: Option<TurnLog>,
    ) -> Self {
        Self {
            index: LiveIndex::new(),
            segmenter,
            embedder,
            batch_size,
            assistant,
            history: Mutex::new(Vec::new()),
            private: AtomicBool::new(false),
            turn_log,
        }
    }

    /// Session wired from configuration: PDF/text extraction, the configured
    /// embedder, HTTP backends, and the turn log when history is enabled.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let segmenter = Segmenter::new(Arc::new(DocumentExtractor), config.chunking.params()?);
        let embedder = create_embedder(&config.embedding)?;
        let assistant = Assistant::from_config(config)?;
        let turn_log = if config.history.enabled {
            Some(TurnLog::open(&config.history.path).await?)
        } else {
            None
        };
        Ok(Self::new(
            segmenter,
            embedder,
            config.embedding.batch_size,
            assistant,
            turn_log,
        ))
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn turn_log(&self) -> Option<&TurnLog> {
        self.turn_log.as_ref()
    }

    /// Segment and index a batch, replacing the previous index.
    ///
    /// Unreadable documents are skipped and reported. If the build fails the
    /// previous index stays live.
    pub async fn upload(&self, docs: Vec<Document>) -> Result<UploadReport, IndexError> {
        let output = self.segmenter.segment(&docs);
        drop(docs);

        let chunks = output.chunks.len();
        let index =
            SimilarityIndex::build(Arc::clone(&self.embedder), output.chunks, self.batch_size)
                .await?;
        self.index.replace(index);

        info!(
            documents = output.documents_indexed,
            skipped = output.skipped.len(),
            chunks,
            "index rebuilt"
        );

        Ok(UploadReport {
            documents_indexed: output.documents_indexed,
            chunks,
            skipped: output.skipped,
        })
    }

    /// Run one turn. On success the exchange is appended to the session
    /// history and, unless private mode is on, to the turn log. Failed turns
    /// leave both untouched.
    pub async fn ask(&self, query: &str) -> Result<Reply, ChatError> {
        let mut history = self.history.lock().await;
        let reply = self.assistant.respond(&self.index, &history, query).await?;

        history.extend(reply.turn.messages());

        if !self.is_private() {
            if let Some(log) = &self.turn_log {
                if let Err(e) = log.append(&reply.turn).await {
                    warn!(error = %e, "failed to record turn");
                }
            }
        }

        Ok(reply)
    }

    /// Forget the conversation and the uploaded documents.
    pub async fn clear(&self) {
        self.history.lock().await.clear();
        self.index.clear();
    }

    pub fn set_private(&self, enabled: bool) {
        self.private.store(enabled, Ordering::SeqCst);
    }

    pub fn is_private(&self) -> bool {
        self.private.load(Ordering::SeqCst)
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Number of chunks in the live index.
    pub fn indexed_chunks(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::{assistant, candidates, Script, ScriptedFactory};
    use crate::embedding::HashingEmbedder;
    use docchat_core::chunk::ChunkParams;
    use docchat_core::gate::{MinScore, RetrievalGate};
    use docchat_core::prompt::PromptMode;

    async fn session(script: Script, log: Option<TurnLog>) -> (ChatSession, Arc<ScriptedFactory>) {
        let factory = ScriptedFactory::new(script);
        let assistant = assistant(
            candidates(None, Some("hf-key")),
            factory.clone(),
            RetrievalGate::new(Box::new(MinScore::new(0.1)), 4),
        );
        let session = ChatSession::new(
            Segmenter::new(Arc::new(DocumentExtractor), ChunkParams::new(200, 20).unwrap()),
            Arc::new(HashingEmbedder::new(4096)),
            8,
            assistant,
            log,
        );
        (session, factory)
    }

    async fn log() -> (tempfile::TempDir, TurnLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = TurnLog::open(&dir.path().join("turns.sqlite")).await.unwrap();
        (dir, log)
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new(
                "policy.txt",
                "Refund Policy: refunds are issued within 30 days of purchase.".as_bytes().to_vec(),
            ),
            Document::new("broken.pdf", b"%PDF-1.7 garbage".to_vec()),
            Document::new("picture.png", vec![0x89, b'P', b'N', b'G']),
        ]
    }

    #[tokio::test]
    async fn test_upload_skips_bad_documents() {
        let (session, _) = session(Script::Reply("ok".into()), None).await;
        let report = session.upload(docs()).await.unwrap();
        assert_eq!(report.documents_indexed, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(session.indexed_chunks(), 1);
    }

    #[tokio::test]
    async fn test_upload_replaces_previous_index() {
        let (session, _) = session(Script::Reply("ok".into()), None).await;
        session.upload(docs()).await.unwrap();
        let report = session
            .upload(vec![Document::new(
                "two.txt",
                "a much longer text ".repeat(30).into_bytes(),
            )])
            .await
            .unwrap();
        assert_eq!(session.indexed_chunks(), report.chunks);
        assert!(report.chunks > 1);
    }

    #[tokio::test]
    async fn test_ask_grounded_after_upload_and_logged() {
        let (_dir, log) = log().await;
        let (session, factory) = session(Script::Reply("30 days.".into()), Some(log)).await;
        session.upload(docs()).await.unwrap();

        let reply = session.ask("What is the refund policy?").await.unwrap();
        assert_eq!(reply.mode, PromptMode::Grounded);
        assert_eq!(factory.prompts()[0].1.mode, PromptMode::Grounded);

        let history = session.history().await;
        assert_eq!(
            history,
            vec![
                Message::user("What is the refund policy?"),
                Message::assistant("30 days.")
            ]
        );
        assert_eq!(session.turn_log().unwrap().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_history_carries_into_next_prompt() {
        let (session, factory) = session(Script::Reply("answer".into()), None).await;
        session.ask("first question").await.unwrap();
        session.ask("second question").await.unwrap();

        let prompts = factory.prompts();
        assert!(prompts[0].1.history.is_empty());
        assert_eq!(
            prompts[1].1.history,
            vec![Message::user("first question"), Message::assistant("answer")]
        );
    }

    #[tokio::test]
    async fn test_private_mode_skips_turn_log() {
        let (_dir, log) = log().await;
        let (session, _) = session(Script::Reply("ok".into()), Some(log)).await;

        session.set_private(true);
        session.ask("secret").await.unwrap();
        assert_eq!(session.turn_log().unwrap().count().await.unwrap(), 0);
        assert_eq!(session.history().await.len(), 2);

        session.set_private(false);
        session.ask("public").await.unwrap();
        let stored = session.turn_log().unwrap().list(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].query, "public");
    }

    #[tokio::test]
    async fn test_turn_log_failure_does_not_fail_turn() {
        let (_dir, log) = log().await;
        let handle = log.clone();
        let (session, _) = session(Script::Reply("still here".into()), Some(log)).await;
        // Closing a clone closes the shared pool, so the append errors.
        handle.close().await;

        let reply = session.ask("hello").await.unwrap();
        assert_eq!(reply.turn.response, "still here");
        assert_eq!(
            session.history().await,
            vec![Message::user("hello"), Message::assistant("still here")]
        );
        assert!(session.turn_log().unwrap().count().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_recorded() {
        let (_dir, log) = log().await;
        let (session, _) = session(Script::Fail("upstream 502".into()), Some(log)).await;

        let err = session.ask("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));
        assert!(session.history().await.is_empty());
        assert_eq!(session.turn_log().unwrap().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_drops_history_and_index() {
        let (session, factory) = session(Script::Reply("ok".into()), None).await;
        session.upload(docs()).await.unwrap();
        session.ask("What is the refund policy?").await.unwrap();

        session.clear().await;
        assert!(session.history().await.is_empty());
        assert_eq!(session.indexed_chunks(), 0);

        session.ask("What is the refund policy?").await.unwrap();
        assert_eq!(factory.prompts()[1].1.mode, PromptMode::Ungrounded);
    }
}
