//! Language model reply generation.
//!
//! [`ReplyGenerator`] is the seam the request pipeline depends on. The
//! production backend is [`ApiLlm`], which talks to any OpenAI-compatible
//! chat completions server (vLLM, llama.cpp server, Ollama, ...).

pub mod api;
pub mod prompt;

pub use api::ApiLlm;
pub use prompt::{ProficiencyLevel, Turn, build_messages};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Produces the assistant's next reply for a role-tagged conversation.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate one reply for `messages` (system entry first, newest user
    /// message last).
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Strip `<think>...</think>` blocks from generated text.
pub(crate) fn strip_think_blocks(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(start) = remaining.find("<think>") {
        result.push_str(&remaining[..start]);
        match remaining[start..].find("</think>") {
            Some(end) => remaining = &remaining[start + end + "</think>".len()..],
            // Unclosed <think>: discard the rest
            None => return result,
        }
    }
    result.push_str(remaining);
    result
}
