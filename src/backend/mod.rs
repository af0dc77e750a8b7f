//! HTTP language-model backends.
//!
//! | Kind | Endpoint | Auth |
//! |------|----------|------|
//! | `gemini` | `POST {base_url}/models/{model}:generateContent` | `x-goog-api-key` header |
//! | `huggingface` | `POST {base_url}/chat/completions` (OpenAI-compatible router) | Bearer token |
//!
//! Both retry 429 and 5xx responses through [`crate::http::send_json`].
//! Clients are built per turn by [`HttpBackendFactory`] from the selected
//! credential.

mod gemini;
mod huggingface;

use anyhow::Result;
use docchat_core::generate::{BackendFactory, BackendKind, LanguageModel};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::http::{self, RetryPolicy};

pub use gemini::GeminiBackend;
pub use huggingface::HuggingFaceBackend;

/// Settings shared by every HTTP backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl BackendSettings {
    pub fn from_config(config: &GenerationConfig, kind: BackendKind) -> Self {
        let backend = config.backend(kind);
        Self {
            model: backend.model.clone(),
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            retry: RetryPolicy::new(config.max_retries),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn client(&self) -> Result<reqwest::Client> {
        http::client(self.timeout)
    }
}

/// Builds real HTTP clients from configuration.
#[derive(Debug, Clone)]
pub struct HttpBackendFactory {
    config: GenerationConfig,
    retry_override: Option<RetryPolicy>,
}

impl HttpBackendFactory {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            retry_override: None,
        }
    }

    /// Use `retry` instead of the configured policy (tests shorten delays).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry_override = Some(retry);
        self
    }

    fn settings(&self, kind: BackendKind) -> BackendSettings {
        let mut settings = BackendSettings::from_config(&self.config, kind);
        if let Some(retry) = self.retry_override {
            settings.retry = retry;
        }
        settings
    }
}

impl BackendFactory for HttpBackendFactory {
    fn create(&self, kind: BackendKind, credential: &str) -> Result<Arc<dyn LanguageModel>> {
        let settings = self.settings(kind);
        Ok(match kind {
            BackendKind::Gemini => Arc::new(GeminiBackend::new(settings, credential)?),
            BackendKind::HuggingFace => Arc::new(HuggingFaceBackend::new(settings, credential)?),
        })
    }
}
