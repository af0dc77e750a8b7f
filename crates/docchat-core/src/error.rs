//! Error taxonomy for the retrieval core.
//!
//! | Error | Scope | Handling |
//! |-------|-------|----------|
//! | [`SegmentationError`] | one document | skipped and logged, batch continues |
//! | [`IndexError`] | build or query | build keeps the previous index live |
//! | [`ConfigurationError`] | one turn | fatal, raised before any generation |
//! | [`GenerationError`] | one turn | surfaced as the turn outcome, never recorded |
//!
//! Querying before any index exists is not an error; it yields an empty
//! result.

use thiserror::Error;

/// A document that could not be turned into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    #[error("{document}: unreadable document: {reason}")]
    Unreadable { document: String, reason: String },

    #[error("{document}: no extractable text")]
    NoText { document: String },
}

impl SegmentationError {
    /// Name of the document that failed.
    pub fn document(&self) -> &str {
        match self {
            SegmentationError::Unreadable { document, .. }
            | SegmentationError::NoText { document } => document,
        }
    }
}

/// Failure while building or querying the similarity index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("embedder returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// No usable language-model backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error(
        "no language-model backend has a credential configured (checked: {})",
        .checked.join(", ")
    )]
    NoCredential { checked: Vec<String> },

    #[error("{backend} backend could not be initialized: {reason}")]
    Backend { backend: String, reason: String },
}

/// A backend call that failed or did not finish in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} generation failed: {message}")]
pub struct GenerationError {
    pub backend: String,
    pub message: String,
    pub timed_out: bool,
}

/// Everything that can end a chat turn without a response.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl ChatError {
    /// Short message for display to the person chatting.
    ///
    /// Each failure class reads differently so a system failure is never
    /// mistaken for the assistant simply having nothing to say.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Configuration(e) => format!("The assistant is not configured: {}", e),
            ChatError::Retrieval(e) => format!("Searching your documents failed: {}", e),
            ChatError::Generation(e) if e.timed_out => format!(
                "The {} model did not answer in time. Please try again.",
                e.backend
            ),
            ChatError::Generation(e) => format!(
                "The {} model failed to produce a response: {}",
                e.backend, e.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credential_lists_checked_backends() {
        let err = ConfigurationError::NoCredential {
            checked: vec!["gemini (GEMINI_API_KEY)".into(), "huggingface (HF_API_KEY)".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("gemini (GEMINI_API_KEY), huggingface (HF_API_KEY)"));
    }

    #[test]
    fn test_user_messages_distinguish_classes() {
        let config: ChatError = ConfigurationError::NoCredential { checked: vec![] }.into();
        let failed: ChatError = GenerationError {
            backend: "gemini".into(),
            message: "HTTP 500".into(),
            timed_out: false,
        }
        .into();
        let timed_out: ChatError = GenerationError {
            backend: "gemini".into(),
            message: "timed out".into(),
            timed_out: true,
        }
        .into();

        assert!(config.user_message().contains("not configured"));
        assert!(failed.user_message().contains("failed to produce a response"));
        assert!(timed_out.user_message().contains("did not answer in time"));
    }

    #[test]
    fn test_segmentation_error_document() {
        let err = SegmentationError::NoText {
            document: "scan.pdf".into(),
        };
        assert_eq!(err.document(), "scan.pdf");
        assert_eq!(err.to_string(), "scan.pdf: no extractable text");
    }
}
