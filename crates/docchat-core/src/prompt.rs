//! Prompt composition for grounded and ungrounded turns.
//!
//! A [`Prompt`] keeps its parts separate (system instruction, history, and
//! the final user message) so chat-style backends can map them onto their
//! own message formats. [`Prompt::render`] flattens everything into one
//! string for plain text-completion backends.

use serde::Serialize;

use crate::models::{Message, RetrievalResult, Role};

/// Instruction for turns answered from retrieved document passages.
pub const GROUNDED_INSTRUCTION: &str = "You are a document assistant. Answer the user's \
question using only the numbered context passages provided with it. Refer to passages by \
their number when you rely on them. If the passages do not contain enough information to \
answer, say explicitly that the uploaded documents do not cover the question instead of \
guessing.";

/// Instruction for turns answered without document context.
pub const UNGROUNDED_INSTRUCTION: &str = "You are a helpful, knowledgeable general-purpose \
assistant. Answer the user's question clearly and accurately, taking the conversation so \
far into account.";

/// Whether a prompt carries retrieved document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Grounded,
    Ungrounded,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Grounded => "grounded",
            PromptMode::Ungrounded => "ungrounded",
        }
    }
}

/// Everything a backend needs to produce one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub mode: PromptMode,
    pub system: String,
    /// Prior conversation, oldest first.
    pub history: Vec<Message>,
    /// Final user message: the query, preceded by the context block in
    /// grounded mode.
    pub user: String,
}

impl Prompt {
    /// Prompt that answers `query` from the retrieved `context`.
    pub fn grounded(context: &RetrievalResult, history: &[Message], query: &str) -> Self {
        let mut user = String::from("Context passages:\n\n");
        user.push_str(&format_context(context));
        user.push_str("\nQuestion: ");
        user.push_str(query);

        Self {
            mode: PromptMode::Grounded,
            system: GROUNDED_INSTRUCTION.to_string(),
            history: history.to_vec(),
            user,
        }
    }

    /// Prompt that answers `query` from general knowledge and history.
    pub fn ungrounded(history: &[Message], query: &str) -> Self {
        Self {
            mode: PromptMode::Ungrounded,
            system: UNGROUNDED_INSTRUCTION.to_string(),
            history: history.to_vec(),
            user: query.to_string(),
        }
    }
}

/// Numbered, delimited passages, each attributed to its source and page.
pub fn format_context(context: &RetrievalResult) -> String {
    let mut out = String::new();
    for (i, hit) in context.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} (page {})\n<<<\n{}\n>>>\n",
            i + 1,
            hit.chunk.source,
            hit.chunk.page,
            hit.chunk.text.trim()
        ));
    }
    out
}

/// The most recent `max` messages of `history`, starting on a user message.
///
/// An assistant message at the front of the window is dropped, so an odd
/// `max` never hands a backend a conversation that opens mid-exchange.
pub fn history_window(history: &[Message], max: usize) -> &[Message] {
    let mut window = &history[history.len().saturating_sub(max)..];
    while let Some((first, rest)) = window.split_first() {
        if first.role == Role::User {
            break;
        }
        window = rest;
    }
    window
}
