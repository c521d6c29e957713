//! Slash command parsing for the shell.
//!
//! Input that starts with `/` controls the session and is never sent to the service.

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the shell.
    Quit,

    /// Clear the conversation history.
    Reset,

    /// Add a file to the set re-sent with every prompt.
    Stage(String),

    /// Clear the staged files.
    Unstage,

    /// List the staged files.
    Files,

    /// Turn the personality on or off.
    Personality(bool),

    /// Change the model.
    Model(String),

    /// Replace the API key.
    Key(String),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Set the token budget.  `None` disables eviction.
    Budget(Option<u32>),

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent as a
/// prompt.
///
/// # Examples
///
/// ```
/// # use llmo::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model gpt-4").is_some());
/// assert!(parse_command("How do I reverse a list?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "reset" | "clear" => ChatCommand::Reset,
        "stage" | "add" => match argument {
            Some(path) => ChatCommand::Stage(path.to_string()),
            None => ChatCommand::Invalid("/stage requires a file path".to_string()),
        },
        "unstage" => ChatCommand::Unstage,
        "files" => ChatCommand::Files,
        "personality" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Personality(value),
            None => ChatCommand::Invalid("/personality expects 'on' or 'off'".to_string()),
        },
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model name".to_string()),
        },
        "key" => match argument {
            Some(key) => ChatCommand::Key(key.to_string()),
            None => ChatCommand::Invalid("/key requires an API key".to_string()),
        },
        "temperature" => match argument {
            Some(arg) => match parse_f32_in_range(arg, 0.0, 2.0) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "budget" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("off") => ChatCommand::Budget(None),
            Some(arg) => match arg.parse::<u32>() {
                Ok(value) => ChatCommand::Budget(Some(value)),
                Err(_) => ChatCommand::Invalid(
                    "/budget expects an integer token count or 'off'".to_string(),
                ),
            },
            None => ChatCommand::Invalid("/budget requires a value".to_string()),
        },
        "stats" | "status" => ChatCommand::Stats,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

/// True if `input` is the bare word that ends the shell.
pub fn is_exit(input: &str) -> bool {
    input.trim() == "exit"
}

fn parse_f32_in_range(value: &str, min: f32, max: f32) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /stage <path>          Send a file as context with every prompt
  /unstage               Stop sending staged files
  /files                 List staged files
  /reset                 Clear conversation history
  /personality on|off    Toggle the assistant's personality
  /model <name>          Change the model (e.g., /model gpt-4)
  /key <key>             Replace the API key
  /temperature <v>       Set temperature 0.0-2.0
  /budget <tokens>       Set the context token budget (or 'off')
  /stats                 Show session statistics
  /help                  Show this help message
  /quit                  Exit (so does typing 'exit')

Ctrl-C interrupts a response; Ctrl-D exits."#
}
