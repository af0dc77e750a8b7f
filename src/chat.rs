//! One chat turn: select a backend, retrieve, compose, generate.
//!
//! Order matters. The backend is selected first so a missing credential is
//! reported before any embedding or network call. Retrieval then decides
//! between a grounded and an ungrounded prompt, and the backend call is
//! bounded by the configured timeout.

use anyhow::Result;
use docchat_core::error::{ChatError, GenerationError};
use docchat_core::gate::{GateDecision, RetrievalGate};
use docchat_core::generate::{BackendFactory, BackendKind, ResponseGenerator};
use docchat_core::index::LiveIndex;
use docchat_core::models::{Message, RetrievalResult, Turn};
use docchat_core::prompt::{history_window, Prompt, PromptMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::HttpBackendFactory;
use crate::config::Config;

/// A successful turn and how it was produced.
#[derive(Debug, Clone)]
pub struct Reply {
    pub turn: Turn,
    pub mode: PromptMode,
    pub backend: BackendKind,
    pub model: String,
    /// Passages the response was grounded on; empty for ungrounded turns.
    pub context: RetrievalResult,
}

impl Reply {
    pub fn is_grounded(&self) -> bool {
        self.mode == PromptMode::Grounded
    }
}

pub struct Assistant {
    gate: RetrievalGate,
    generator: ResponseGenerator,
    timeout: Duration,
    history_messages: usize,
}

impl Assistant {
    pub fn new(
        gate: RetrievalGate,
        generator: ResponseGenerator,
        timeout: Duration,
        history_messages: usize,
    ) -> Self {
        Self {
            gate,
            generator,
            timeout,
            history_messages,
        }
    }

    /// Assistant wired to the HTTP backends, credentials from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_factory(
            config,
            Arc::new(HttpBackendFactory::new(config.generation.clone())),
        )
    }

    pub fn with_factory(config: &Config, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        let gate = RetrievalGate::new(
            config.retrieval.relevance_policy()?,
            config.retrieval.top_k,
        );
        let generator = ResponseGenerator::new(config.generation.candidates(), factory);
        Ok(Self::new(
            gate,
            generator,
            Duration::from_secs(config.generation.timeout_secs),
            config.generation.history_messages,
        ))
    }

    /// Answer `query` given the prior `history` (not including `query`).
    pub async fn respond(
        &self,
        index: &LiveIndex,
        history: &[Message],
        query: &str,
    ) -> Result<Reply, ChatError> {
        let backend = self.generator.select()?;
        let decision = self.gate.retrieve(index, query).await?;
        let window = history_window(history, self.history_messages);

        let (prompt, context) = match decision {
            GateDecision::Relevant(context) => (Prompt::grounded(&context, window, query), context),
            GateDecision::NoContext => (Prompt::ungrounded(window, query), RetrievalResult::empty()),
        };

        info!(
            backend = %backend.kind,
            mode = prompt.mode.as_str(),
            passages = context.len(),
            history = window.len(),
            "generating response"
        );

        let text = match tokio::time::timeout(self.timeout, backend.model.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                return Err(GenerationError {
                    backend: backend.kind.to_string(),
                    message: format!("{:#}", e),
                    timed_out: false,
                }
                .into())
            }
            Err(_) => {
                return Err(GenerationError {
                    backend: backend.kind.to_string(),
                    message: format!("no response within {}s", self.timeout.as_secs_f32()),
                    timed_out: true,
                }
                .into())
            }
        };
        debug!(chars = text.len(), "response received");

        let mode = prompt.mode;
        Ok(Reply {
            turn: Turn::new(query, text, backend.kind.as_str(), mode == PromptMode::Grounded),
            mode,
            backend: backend.kind,
            model: backend.model.model_name().to_string(),
            context,
        })
    }
}
