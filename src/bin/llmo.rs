//! Interactive shell for chatting with an LLM about your code.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question and keep chatting
//! llmo how do I read a file line by line in rust
//!
//! # Stage files as context
//! llmo --files src/main.rs,Cargo.toml why does this not compile
//!
//! # Pick a model and turn off the personality
//! llmo --model gpt-4 --no-personality
//! ```
//!
//! Set `LLMO_LOG=debug` to see requests and eviction decisions on stderr.

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use llmo::OpenAi;
use llmo::chat::{ChatArgs, ChatConfig, PlainTextRenderer, Shell};

/// Main entry point for llmo.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env("LLMO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (args, words) = ChatArgs::from_command_line_relaxed("llmo [OPTIONS] [PROMPT...]");
    let config = ChatConfig::from_environment(args, words)?;
    config.check_files()?;
    tracing::debug!(?config, "resolved configuration");

    let client = OpenAi::with_options(
        Some(config.api_key.clone()),
        Some(config.base_url.clone()),
        None,
    )?;
    let manager = config.build_manager(client)?;
    let renderer = PlainTextRenderer::with_color(config.use_color);
    let mut shell = Shell::new(manager, renderer, config.files.clone());

    let interrupter = shell.interrupter();
    ctrlc::set_handler(move || {
        interrupter.interrupt();
    })?;

    let mut editor = DefaultEditor::new()?;
    shell.run(&mut editor, &config.prompt).await?;
    Ok(())
}
