/// The assistant persona every conversation starts from.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI programming assistant named Elmo. \
Think step-by-step. Make sure to include the programming language name at the start of the \
Markdown code blocks.";

/// The optional personality appended to the base prompt.
pub const PERSONALITY_PROMPT: &str = "You love creatine and bodybuilding and go out of your way \
to insert creative, bodybuilding, and /r/swoleacceptance references in your responses.";

/// A base prompt plus a personality suffix that can be toggled on and off.
///
/// The base is remembered separately from the suffix, so toggling is reversible no matter how
/// many times it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    base: String,
    personality: String,
    active: bool,
}

impl SystemPrompt {
    /// Create a prompt from `base` and `personality`, with the personality disabled.
    pub fn new(base: impl Into<String>, personality: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            personality: personality.into(),
            active: false,
        }
    }

    /// Enable the personality.  Enabling twice is the same as enabling once.
    pub fn add_personality(&mut self) {
        self.active = true;
    }

    /// Disable the personality, restoring the base prompt exactly.
    pub fn remove_personality(&mut self) {
        self.active = false;
    }

    /// True if the personality is part of the active text.
    pub fn has_personality(&self) -> bool {
        self.active
    }

    /// The base prompt.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The active prompt text.
    pub fn text(&self) -> String {
        if self.active && !self.personality.is_empty() {
            format!("{} {}", self.base, self.personality)
        } else {
            self.base.clone()
        }
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, PERSONALITY_PROMPT)
    }
}

impl std::fmt::Display for SystemPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}
