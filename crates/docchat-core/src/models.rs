//! Core data models that flow through the segment → index → retrieve →
//! generate pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded document: raw bytes plus the name it was uploaded under.
///
/// Consumed by the segmenter and then dropped; nothing downstream keeps
/// the bytes.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A contiguous span of one page of extracted document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// `"{source}:p{page}:c{chunk_index}"`, prefixed with `d{position}/` when
    /// segmented as part of a batch.
    pub id: String,
    /// Name of the source document.
    pub source: String,
    /// 1-based page number within the source document.
    pub page: usize,
    /// Position within the source document, contiguous from 0 across pages.
    pub chunk_index: usize,
    /// Character offset of the chunk's first character within its page.
    pub start: usize,
    /// Number of leading characters repeated from the previous chunk of the
    /// same page (0 for the first chunk of a page).
    pub overlap: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// The part of the chunk not shared with its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Nearest chunks for one query, ordered by descending score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    /// Highest score in the result, if any.
    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|h| h.score)
    }
}

/// Who said a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed exchange: one query and the response generated for it.
///
/// Only successful generations become turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub query: String,
    pub response: String,
    /// Backend that produced the response (e.g. `"gemini"`).
    pub backend: String,
    /// Whether retrieved document context was part of the prompt.
    pub grounded: bool,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl Turn {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        backend: impl Into<String>,
        grounded: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            response: response.into(),
            backend: backend.into(),
            grounded,
            created_at: Utc::now().timestamp(),
        }
    }

    /// The turn as the user/assistant message pair appended to history.
    pub fn messages(&self) -> [Message; 2] {
        [
            Message::user(self.query.clone()),
            Message::assistant(self.response.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, overlap: usize) -> Chunk {
        Chunk {
            id: "a.pdf:p1:c0".to_string(),
            source: "a.pdf".to_string(),
            page: 1,
            chunk_index: 0,
            start: 0,
            overlap,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_fresh_text_skips_overlap_chars() {
        assert_eq!(chunk("abcdef", 2).fresh_text(), "cdef");
        assert_eq!(chunk("abcdef", 0).fresh_text(), "abcdef");
        assert_eq!(chunk("ab", 2).fresh_text(), "");
    }

    #[test]
    fn test_fresh_text_multibyte() {
        assert_eq!(chunk("éàü-x", 3).fresh_text(), "-x");
    }

    #[test]
    fn test_turn_messages_pair() {
        let turn = Turn::new("q", "r", "gemini", false);
        let [user, assistant] = turn.messages();
        assert_eq!(user, Message::user("q"));
        assert_eq!(assistant, Message::assistant("r"));
        assert!(!turn.id.is_empty());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
