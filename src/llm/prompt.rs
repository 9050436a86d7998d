//! Prompt assembly: system instruction, bounded history, new user message.

use super::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Number of most recent turns forwarded to the model by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Base instruction for the conversation partner, before the level clause.
pub const BASE_SYSTEM_PROMPT: &str = "\
You are a professional level AI English conversation partner designed to help improve speaking skills.
Your goal is to:
1. Engage in natural, flowing conversations in English
2. Gently correct pronunciation, grammar, and vocabulary mistakes
3. Use appropriate idioms and expressions in your responses
4. Adapt to the user's proficiency level
5. Keep your responses concise to maintain conversational flow
6. Responses should be less than 256 words.

Keep your responses friendly, encouraging, and focused on helping the user improve their spoken English.
";

/// The learner's self-reported proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    /// Resolve a caller-supplied level string.
    ///
    /// `Beginner`, `Intermediate` and `Advanced` are matched exactly, as the
    /// frontend sends them. Anything else, including other casings, resolves
    /// to [`ProficiencyLevel::Advanced`] with a warning.
    pub fn resolve(raw: &str) -> Self {
        match raw.parse() {
            Ok(level) => level,
            Err(UnknownLevel(other)) => {
                warn!("unrecognized proficiency level {other:?}, using Advanced");
                Self::Advanced
            }
        }
    }

    /// Instruction clause appended to the base system prompt.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Beginner => {
                "The user is a beginner, so use simple vocabulary and short sentences."
            }
            Self::Intermediate => {
                "The user has intermediate proficiency, so use natural language with some challenging vocabulary."
            }
            Self::Advanced => {
                "The user is advanced, so use sophisticated vocabulary and complex sentences."
            }
        }
    }

    /// Full system prompt for this level.
    pub fn system_prompt(self) -> String {
        format!("{BASE_SYSTEM_PROMPT}\n{}", self.instruction())
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        })
    }
}

/// A level string that names none of the known levels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown proficiency level: {0:?}")]
pub struct UnknownLevel(pub String);

impl FromStr for ProficiencyLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Self::Beginner),
            "Intermediate" => Ok(Self::Intermediate),
            "Advanced" => Ok(Self::Advanced),
            _ => Err(UnknownLevel(s.to_owned())),
        }
    }
}

/// One exchange of conversation history.
///
/// On the wire a turn is a two-element array: `["user text", "assistant text"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

impl From<(String, String)> for Turn {
    fn from((user, assistant): (String, String)) -> Self {
        Self { user, assistant }
    }
}

impl From<Turn> for (String, String) {
    fn from(turn: Turn) -> Self {
        (turn.user, turn.assistant)
    }
}

/// Parse the JSON-encoded history form field.
///
/// # Errors
///
/// Returns the `serde_json` error for anything that is not an array of
/// two-string arrays.
pub fn parse_history(json: &str) -> serde_json::Result<Vec<Turn>> {
    serde_json::from_str(json)
}

/// The last `limit` turns, oldest first.
pub fn recent_turns(history: &[Turn], limit: usize) -> &[Turn] {
    &history[history.len().saturating_sub(limit)..]
}

/// Build the role-tagged message list for one reply.
///
/// Layout: one system entry (base prompt + level clause), a user/assistant
/// pair for each of the last `history_limit` turns, then the new user message.
pub fn build_messages(
    message: &str,
    history: &[Turn],
    level: ProficiencyLevel,
    history_limit: usize,
) -> Vec<ChatMessage> {
    let recent = recent_turns(history, history_limit);
    let mut messages = Vec::with_capacity(recent.len() * 2 + 2);

    messages.push(ChatMessage::new(Role::System, level.system_prompt()));
    for turn in recent {
        messages.push(ChatMessage::new(Role::User, turn.user.as_str()));
        messages.push(ChatMessage::new(Role::Assistant, turn.assistant.as_str()));
    }
    messages.push(ChatMessage::new(Role::User, message));
    messages
}
