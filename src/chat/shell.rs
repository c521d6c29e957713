//! The interactive line-mode shell.
//!
//! Each line is either a slash command, the word `exit`, or a prompt.  Prompts are streamed back
//! through the renderer fragment by fragment; staged files ride along with every prompt.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use crate::chat::commands::{ChatCommand, help_text, is_exit, parse_command};
use crate::completion::CompletionService;
use crate::manager::{ConversationManager, StreamState};
use crate::render::Renderer;
use crate::{Error, Result};

/// What the shell should do after a line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Read another line.
    Continue,

    /// Leave the shell.
    Quit,
}

/// Cancels whichever response is streaming when [`Interrupter::interrupt`] is called.
///
/// Cloned into the Ctrl-C handler.
#[derive(Clone, Default)]
pub struct Interrupter {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupter {
    /// Cancel the response in flight.  Returns false if there was none.
    pub fn interrupt(&self) -> bool {
        let Ok(current) = self.current.lock() else {
            return false;
        };
        match current.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(token.clone());
        }
        token
    }

    fn disarm(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

/// A conversation manager wired to a renderer and a set of staged files.
pub struct Shell<S, R> {
    manager: ConversationManager<S>,
    renderer: R,
    staged: Vec<PathBuf>,
    interrupter: Interrupter,
}

impl<S: CompletionService, R: Renderer> Shell<S, R> {
    /// Create a shell with `files` staged.
    pub fn new(manager: ConversationManager<S>, renderer: R, files: Vec<PathBuf>) -> Self {
        Self {
            manager,
            renderer,
            staged: files,
            interrupter: Interrupter::default(),
        }
    }

    /// A handle that cancels the response currently streaming.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// The conversation manager.
    pub fn manager(&self) -> &ConversationManager<S> {
        &self.manager
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The staged files.
    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }

    /// Submit `prompt` (if non-empty) and then read lines until the user quits.
    pub async fn run(&mut self, editor: &mut DefaultEditor, prompt: &str) -> Result<()> {
        self.renderer.print_info(&format!(
            "llmo (model: {}). Type /help for commands, exit to quit.",
            self.manager.model()
        ));
        if !prompt.trim().is_empty() {
            self.renderer.print_prompt(prompt);
            self.respond(prompt).await;
        }

        loop {
            match editor.readline(">>> ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.trim());
                    }
                    if self.handle_line(&line).await == Flow::Quit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C at the prompt discards the line.
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Io(err)) => {
                    return Err(Error::io("terminal input failed", err));
                }
                Err(err) => {
                    self.renderer.print_error(&format!("Input error: {}", err));
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one line of input.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        if is_exit(line) {
            return Flow::Quit;
        }
        match parse_command(line) {
            Some(command) => self.handle_command(command),
            None => {
                self.respond(line).await;
                Flow::Continue
            }
        }
    }

    fn handle_command(&mut self, command: ChatCommand) -> Flow {
        match command {
            ChatCommand::Help => {
                for line in help_text().lines() {
                    self.renderer.print_info(&format!("    {}", line));
                }
            }
            ChatCommand::Quit => return Flow::Quit,
            ChatCommand::Reset => {
                self.manager.reset();
                self.renderer.print_info("Conversation cleared.");
            }
            ChatCommand::Stage(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    self.renderer
                        .print_error(&format!("{} is not a readable file", path.display()));
                } else if self.staged.contains(&path) {
                    self.renderer
                        .print_info(&format!("{} is already staged.", path.display()));
                } else {
                    self.renderer
                        .print_info(&format!("Staged {}.", path.display()));
                    self.staged.push(path);
                }
            }
            ChatCommand::Unstage => {
                self.staged.clear();
                self.renderer.print_info("No files staged.");
            }
            ChatCommand::Files => {
                if self.staged.is_empty() {
                    self.renderer.print_info("No files staged.");
                }
                for path in &self.staged {
                    self.renderer.print_info(&format!("    {}", path.display()));
                }
            }
            ChatCommand::Personality(true) => {
                self.manager.add_personality();
                self.renderer.print_info("Personality enabled.");
            }
            ChatCommand::Personality(false) => {
                self.manager.remove_personality();
                self.renderer.print_info("Personality disabled.");
            }
            ChatCommand::Model(model) => {
                self.manager.set_model(model.as_str());
                self.renderer
                    .print_info(&format!("Model changed to: {}", self.manager.model()));
            }
            ChatCommand::Key(key) => match self.manager.service_mut().set_api_key(&key) {
                Ok(()) => self.renderer.print_info("API key replaced."),
                Err(err) => self.renderer.print_error(&err.to_string()),
            },
            ChatCommand::Temperature(temperature) => {
                match self.manager.set_temperature(temperature) {
                    Ok(()) => self
                        .renderer
                        .print_info(&format!("temperature set to {temperature:.2}")),
                    Err(err) => self.renderer.print_error(&err.to_string()),
                }
            }
            ChatCommand::Budget(budget) => {
                self.manager.set_budget(budget);
                match budget {
                    Some(tokens) => self
                        .renderer
                        .print_info(&format!("Token budget set to {tokens}.")),
                    None => self.renderer.print_info("Token budget disabled."),
                }
            }
            ChatCommand::Stats => self.print_stats(),
            ChatCommand::Invalid(message) => self.renderer.print_error(&message),
        }
        Flow::Continue
    }

    /// Stream the answer to `prompt`, reporting failures through the renderer.
    async fn respond(&mut self, prompt: &str) {
        let cancel = self.interrupter.arm();
        let result = self.stream_reply(prompt, cancel).await;
        self.interrupter.disarm();
        match result {
            Ok(()) => {}
            Err(err) if err.is_aborted() => self.renderer.print_interrupted(),
            Err(err) => {
                tracing::debug!(error = %err, "prompt failed");
                self.renderer.print_error(&err.to_string());
            }
        }
    }

    async fn stream_reply(&mut self, prompt: &str, cancel: CancellationToken) -> Result<()> {
        let mut stream = self
            .manager
            .asubmit_with_cancellation(prompt, &self.staged, cancel)
            .await?;
        while let Some(fragment) = stream.next().await {
            self.renderer.print_text(&fragment?);
        }
        match stream.state() {
            StreamState::Committed => self.renderer.finish_response(),
            _ => self.renderer.print_interrupted(),
        }
        Ok(())
    }

    fn print_stats(&mut self) {
        let budget = match self.manager.budget() {
            Some(tokens) => tokens.to_string(),
            None => "(none)".to_string(),
        };
        let lines = [
            "Session Statistics:".to_string(),
            format!("  Model: {}", self.manager.model()),
            format!("  Turns: {}", self.manager.conversation().len()),
            format!(
                "  Estimated tokens: {:.0}",
                self.manager.estimated_tokens()
            ),
            format!("  Budget: {budget}"),
            format!("  Temperature: {:.2}", self.manager.temperature()),
            format!(
                "  Personality: {}",
                if self.manager.has_personality() {
                    "on"
                } else {
                    "off"
                }
            ),
            format!("  Staged files: {}", self.staged.len()),
        ];
        for line in lines {
            self.renderer.print_info(&format!("    {line}"));
        }
    }
}
