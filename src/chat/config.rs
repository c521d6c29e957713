//! Configuration types for the shell.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration that
//! combines those arguments with the environment.

use std::io;
use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::client::{API_KEY_ENV, DEFAULT_API_URL};
use crate::completion::CompletionService;
use crate::manager::{ConversationManager, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_TEMPERATURE};
use crate::types::Model;
use crate::{Error, Result};

/// Disables the personality when it starts with `t`/`T` or equals `1`.
pub const DISABLE_PERSONALITY_ENV: &str = "LLMO_DISABLE_PERSONALITY";

/// Overrides the default token budget.
pub const MAX_TOKENS_ENV: &str = "LLMO_MAX_TOKENS";

/// Command-line arguments for llmo.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Files to send as context with every prompt.
    #[arrrg(optional, "Comma-separated files to stage as context", "PATHS")]
    pub files: Option<String>,

    /// Model to use.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// API key.
    #[arrrg(optional, "API key (default: $OPENAI_API_KEY)", "KEY")]
    pub key: Option<String>,

    /// Disable the personality.
    #[arrrg(flag, "Disable the assistant's personality")]
    pub no_personality: bool,

    /// Token budget for the conversation.
    #[arrrg(optional, "Context token budget (default: $LLMO_MAX_TOKENS or 4097)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature 0.0-2.0 (default: 0.7)", "TEMP")]
    pub temperature: Option<String>,

    /// API base URL.
    #[arrrg(optional, "API base URL (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a shell session.
///
/// This struct holds the resolved configuration values after combining command-line arguments,
/// the environment, and defaults.
#[derive(Clone, PartialEq)]
pub struct ChatConfig {
    /// Prompt to submit before reading input.  Empty means none.
    pub prompt: String,

    /// Files staged as context.
    pub files: Vec<PathBuf>,

    /// The model to use for generating responses.
    pub model: Model,

    /// The API credential.
    pub api_key: String,

    /// Whether the personality starts enabled.
    pub personality: bool,

    /// Token budget for the conversation.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// API base URL.
    pub base_url: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values and the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            prompt: String::new(),
            files: Vec::new(),
            model: Model::default(),
            api_key: api_key.into(),
            personality: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            base_url: DEFAULT_API_URL.to_string(),
            use_color: true,
        }
    }

    /// Resolve arguments against the process environment.
    pub fn from_environment(args: ChatArgs, words: Vec<String>) -> Result<Self> {
        Self::from_args_and_env(args, words, |name| std::env::var(name).ok())
    }

    /// Resolve arguments against an environment lookup.
    ///
    /// `words` are the free arguments; joined with spaces they form the initial prompt.
    pub fn from_args_and_env(
        args: ChatArgs,
        words: Vec<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = args.key.or_else(|| env(API_KEY_ENV)).ok_or_else(|| {
            Error::authentication(format!(
                "API key not provided: pass --key or set {API_KEY_ENV}"
            ))
        })?;
        let mut config = ChatConfig::new(api_key);

        config.prompt = words.join(" ");
        if let Some(files) = args.files {
            config.files = parse_file_list(&files);
        }
        if let Some(model) = args.model {
            config.model = Model::from(model);
        }
        config.personality =
            !(args.no_personality || env(DISABLE_PERSONALITY_ENV).is_some_and(|v| is_truthy(&v)));
        config.max_tokens = match (args.max_tokens, env(MAX_TOKENS_ENV)) {
            (Some(max_tokens), _) => max_tokens,
            (None, Some(value)) => value.trim().parse().map_err(|_| {
                Error::validation(
                    format!("{MAX_TOKENS_ENV} must be a token count, got {value:?}"),
                    Some("max_tokens".to_string()),
                )
            })?,
            (None, None) => DEFAULT_MAX_TOKENS,
        };
        if let Some(temperature) = args.temperature {
            config.temperature = parse_temperature(&temperature)?;
        }
        if let Some(base_url) = args.base_url {
            config.base_url = base_url;
        }
        config.use_color = !args.no_color;
        Ok(config)
    }

    /// Fail if any staged file does not exist.
    pub fn check_files(&self) -> Result<()> {
        for path in &self.files {
            if !path.is_file() {
                return Err(Error::file_unreadable(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, "no such file"),
                ));
            }
        }
        Ok(())
    }

    /// Build a manager that talks to `service` with these settings.
    pub fn build_manager<S: CompletionService>(
        &self,
        service: S,
    ) -> Result<ConversationManager<S>> {
        Ok(ConversationManager::new(service)
            .with_model(self.model.clone())
            .with_temperature(self.temperature)?
            .with_budget(Some(self.max_tokens))
            .with_personality(self.personality))
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("prompt", &self.prompt)
            .field("files", &self.files)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("personality", &self.personality)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("use_color", &self.use_color)
            .finish()
    }
}

fn parse_file_list(files: &str) -> Vec<PathBuf> {
    files
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn parse_temperature(value: &str) -> Result<f32> {
    let temperature: f32 = value.trim().parse().map_err(|_| {
        Error::validation(
            format!("temperature must be a number, got {value:?}"),
            Some("temperature".to_string()),
        )
    })?;
    if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(Error::validation(
            format!("temperature must be between 0 and {MAX_TEMPERATURE}, got {temperature}"),
            Some("temperature".to_string()),
        ));
    }
    Ok(temperature)
}

fn is_truthy(value: &str) -> bool {
    value.starts_with(['t', 'T']) || value == "1"
}
