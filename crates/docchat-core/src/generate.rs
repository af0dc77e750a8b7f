//! Language-model backend selection.
//!
//! Backends are tried in a fixed priority order. The first one with a
//! non-blank credential is used for the whole turn; nothing is re-selected
//! mid-turn and backends are never mixed within one response. If no
//! candidate has a credential, selection fails with
//! [`ConfigurationError::NoCredential`] before any backend is constructed.
//!
//! Concrete HTTP clients live in the `docchat` app crate and are created
//! through a [`BackendFactory`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::prompt::Prompt;

/// The supported backend providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gemini,
    HuggingFace,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::HuggingFace => "huggingface",
        }
    }

    /// Environment variable the credential is read from by default.
    pub fn default_credential_env(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "GEMINI_API_KEY",
            BackendKind::HuggingFace => "HF_API_KEY",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gemini" => Ok(BackendKind::Gemini),
            "huggingface" | "hf" => Ok(BackendKind::HuggingFace),
            other => anyhow::bail!(
                "Unknown backend: '{}'. Must be gemini or huggingface.",
                other
            ),
        }
    }
}

/// The one capability every backend offers: turn a prompt into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier used for the request (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Generate a response. The text is returned as the backend produced it.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Builds a backend client from its credential.
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind, credential: &str) -> Result<Arc<dyn LanguageModel>>;
}

/// One entry of the priority list.
#[derive(Clone)]
pub struct Candidate {
    pub kind: BackendKind,
    /// Where the credential came from, for error messages (e.g. an env var).
    pub credential_source: String,
    pub credential: Option<String>,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("kind", &self.kind)
            .field("credential_source", &self.credential_source)
            .field("available", &self.is_available())
            .finish()
    }
}

impl Candidate {
    pub fn new(kind: BackendKind, credential: Option<String>) -> Self {
        Self {
            kind,
            credential_source: kind.default_credential_env().to_string(),
            credential,
        }
    }

    /// True when a non-blank credential is present.
    pub fn is_available(&self) -> bool {
        self.credential
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// First available candidate in priority order.
pub fn select_candidate(candidates: &[Candidate]) -> Result<&Candidate, ConfigurationError> {
    candidates
        .iter()
        .find(|c| c.is_available())
        .ok_or_else(|| ConfigurationError::NoCredential {
            checked: candidates
                .iter()
                .map(|c| format!("{} ({})", c.kind, c.credential_source))
                .collect(),
        })
}

/// A backend chosen for one turn.
#[derive(Clone)]
pub struct SelectedBackend {
    pub kind: BackendKind,
    pub model: Arc<dyn LanguageModel>,
}

impl fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("kind", &self.kind)
            .field("model", &self.model.model_name())
            .finish()
    }
}

/// Owns the priority list and turns a selection into a live client.
pub struct ResponseGenerator {
    candidates: Vec<Candidate>,
    factory: Arc<dyn BackendFactory>,
}

impl ResponseGenerator {
    pub fn new(candidates: Vec<Candidate>, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            candidates,
            factory,
        }
    }

    /// Pick the backend for this turn.
    pub fn select(&self) -> Result<SelectedBackend, ConfigurationError> {
        let candidate = select_candidate(&self.candidates)?;
        let credential = candidate.credential.as_deref().unwrap_or_default();
        let model = self
            .factory
            .create(candidate.kind, credential)
            .map_err(|e| ConfigurationError::Backend {
                backend: candidate.kind.to_string(),
                reason: e.to_string(),
            })?;
        debug!(backend = %candidate.kind, model = model.model_name(), "selected backend");
        Ok(SelectedBackend {
            kind: candidate.kind,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Echo(String);

    #[async_trait]
    impl LanguageModel for Echo {
        fn model_name(&self) -> &str {
            &self.0
        }
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            Ok(prompt.user.clone())
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        created: Mutex<Vec<(BackendKind, String)>>,
    }

    impl BackendFactory for RecordingFactory {
        fn create(&self, kind: BackendKind, credential: &str) -> Result<Arc<dyn LanguageModel>> {
            self.created
                .lock()
                .unwrap()
                .push((kind, credential.to_string()));
            Ok(Arc::new(Echo(format!("{}-model", kind))))
        }
    }

    struct BrokenFactory;

    impl BackendFactory for BrokenFactory {
        fn create(&self, _: BackendKind, _: &str) -> Result<Arc<dyn LanguageModel>> {
            anyhow::bail!("invalid base url")
        }
    }

    fn candidates(a: Option<&str>, b: Option<&str>) -> Vec<Candidate> {
        vec![
            Candidate::new(BackendKind::Gemini, a.map(str::to_string)),
            Candidate::new(BackendKind::HuggingFace, b.map(str::to_string)),
        ]
    }

    #[test]
    fn test_lower_priority_selected_when_higher_missing() {
        let cands = candidates(None, Some("hf-key"));
        let selected = select_candidate(&cands).unwrap();
        assert_eq!(selected.kind, BackendKind::HuggingFace);
    }

    #[test]
    fn test_higher_priority_wins_when_both_present() {
        let cands = candidates(Some("g-key"), Some("hf-key"));
        let selected = select_candidate(&cands).unwrap();
        assert_eq!(selected.kind, BackendKind::Gemini);
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let cands = candidates(Some("   "), Some("hf-key"));
        let selected = select_candidate(&cands).unwrap();
        assert_eq!(selected.kind, BackendKind::HuggingFace);
    }

    #[test]
    fn test_no_credentials_is_configuration_error_before_creation() {
        let factory = Arc::new(RecordingFactory::default());
        let generator = ResponseGenerator::new(candidates(None, Some("")), factory.clone());
        let err = generator.select().unwrap_err();
        assert!(matches!(err, ConfigurationError::NoCredential { ref checked } if checked.len() == 2));
        assert!(factory.created.lock().unwrap().is_empty());
    }

    #[test]
    fn test_select_passes_credential_to_factory() {
        let factory = Arc::new(RecordingFactory::default());
        let generator = ResponseGenerator::new(candidates(None, Some("hf-key")), factory.clone());
        let selected = generator.select().unwrap();
        assert_eq!(selected.kind, BackendKind::HuggingFace);
        assert_eq!(selected.model.model_name(), "huggingface-model");
        assert_eq!(
            factory.created.lock().unwrap().as_slice(),
            &[(BackendKind::HuggingFace, "hf-key".to_string())]
        );
    }

    #[test]
    fn test_factory_failure_is_configuration_error() {
        let generator = ResponseGenerator::new(candidates(Some("k"), None), Arc::new(BrokenFactory));
        let err = generator.select().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Backend {
                backend: "gemini".into(),
                reason: "invalid base url".into()
            }
        );
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("gemini".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert_eq!("hf".parse::<BackendKind>().unwrap(), BackendKind::HuggingFace);
        assert!("openai".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_candidate_debug_hides_credential() {
        let c = Candidate::new(BackendKind::Gemini, Some("secret-key".into()));
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("available: true"));
    }
}
