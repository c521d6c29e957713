//! The interactive shell for conversing with the assistant.
//!
//! This module provides a streaming line-mode interface built on top of the
//! [`ConversationManager`](crate::ConversationManager). It supports:
//!
//! - Streaming responses with real-time token display and Ctrl-C interruption
//! - Files staged as context and re-sent with every prompt
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and environment resolution
//! - [`commands`]: Slash command parsing
//! - [`shell`]: The read-eval-print loop

mod commands;
mod config;
mod shell;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, is_exit, parse_command};
pub use config::{ChatArgs, ChatConfig, DISABLE_PERSONALITY_ENV, MAX_TOKENS_ENV};
pub use shell::{Flow, Interrupter, Shell};
