use serde::Deserialize;

use crate::types::{FinishReason, Role};

/// One `data:` payload of a streaming chat completion.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    /// Provider-assigned identifier, repeated on every chunk.
    #[serde(default)]
    pub id: Option<String>,

    /// Incremental choices; llmo only reads the first.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// The incremental part of one choice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    /// What changed since the previous chunk.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Set on the last chunk of the choice.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Fields that may appear in a chunk's delta.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    /// Announces the speaker; sent once at the start.  Roles other than user, assistant, and
    /// system yield no event.
    #[serde(default)]
    pub role: Option<String>,

    /// Incremental text.
    #[serde(default)]
    pub content: Option<String>,
}

/// A normalized streaming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Announces who is speaking; carries no text.
    Role(Role),

    /// Incremental text of the assistant turn.
    Delta(String),

    /// The response is complete; no further events follow.
    Finish(FinishReason),
}

impl ChatCompletionChunk {
    /// Normalize this chunk into the events it carries, in role, delta, finish order.
    ///
    /// A chunk that carries none of them yields no events.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let Some(choice) = self.choices.into_iter().next() else {
            return events;
        };
        if let Some(role) = choice.delta.role.as_deref().and_then(known_role) {
            events.push(StreamEvent::Role(role));
        }
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(StreamEvent::Delta(content));
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish(reason));
        }
        events
    }
}

fn known_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}
