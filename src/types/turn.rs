use std::fmt;

use serde::{Deserialize, Serialize};

/// Characters per token used to approximate token counts without a tokenizer.
pub const CHARS_PER_TOKEN: f64 = 4.68;

const FENCE: &str = "```";

/// Who authored a turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard, or a file they staged.
    User,

    /// The model.
    Assistant,

    /// The system prompt.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One role-tagged message in a conversation.
///
/// File turns are ordinary user turns whose content is the file's label in backticks, a
/// newline, and the file text inside a triple-backtick fence.  The shape of the content is the
/// only thing that marks them, so they round-trip through the wire format unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// The role of the author.
    pub role: Role,

    /// The text of the turn.
    pub content: String,
}

impl Turn {
    /// Create a new turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a file turn quoting `text` under `label`.
    pub fn file(label: &str, text: &str) -> Self {
        Self::user(format!("{}{FENCE}\n{text}\n{FENCE}", file_marker(label)))
    }

    /// True if this turn has the shape of a file turn.
    pub fn is_file_turn(&self) -> bool {
        self.role == Role::User && self.content.starts_with('`') && self.content.ends_with(FENCE)
    }

    /// True if this turn quotes the file identified by `label`.
    pub fn is_file_turn_for(&self, label: &str) -> bool {
        self.role == Role::User && self.content.starts_with(&file_marker(label))
    }

    /// The number of characters in this turn's content.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// The estimated token cost of this turn.
    pub fn estimated_tokens(&self) -> f64 {
        estimate_tokens(&self.content)
    }
}

/// Estimate the token cost of `text`.
pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

fn file_marker(label: &str) -> String {
    format!("`{label}`\n")
}
