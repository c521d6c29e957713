//! Chat and pair-programming with an LLM from the command line.
//!
//! The heart of the crate is [`ConversationManager`]: it keeps the message log, stages files as
//! context turns, evicts old turns to stay within a token budget, and submits the conversation
//! to a [`CompletionService`] either whole ([`ConversationManager::submit`]) or as a stream of
//! fragments ([`ConversationManager::asubmit`]).  [`OpenAi`] is the HTTP implementation of the
//! service; [`chat`] is the line-mode shell built on top.

// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod completion;
pub mod conversation;
pub mod error;
pub mod manager;
pub mod observability;
pub mod render;
pub mod sse;
pub mod system_prompt;
pub mod types;

// Re-exports
pub use client::OpenAi;
pub use client_logger::ClientLogger;
pub use completion::{CompletionRequest, CompletionService, EventStream};
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use manager::{
    ConversationManager, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ResponseStream, StreamState,
};
pub use observability::register_biometrics;
pub use system_prompt::{DEFAULT_SYSTEM_PROMPT, PERSONALITY_PROMPT, SystemPrompt};
pub use types::*;
