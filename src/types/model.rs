use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Represents a chat model identifier.
///
/// This can be one of the models llmo knows about or a custom string value
/// for models that may be added in the future.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier (for newer or fine-tuned models)
    Custom(String),
}

/// Chat models offered by the shell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// GPT-3.5 Turbo
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,

    /// GPT-4
    #[serde(rename = "gpt-4")]
    Gpt4,

    /// GPT-4 with the 32k context window
    #[serde(rename = "gpt-4-32k")]
    Gpt4_32k,
}

impl KnownModel {
    /// Every known model, in the order they are offered to users.
    pub const ALL: [KnownModel; 3] = [
        KnownModel::Gpt35Turbo,
        KnownModel::Gpt4,
        KnownModel::Gpt4_32k,
    ];

    /// The identifier sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gpt35Turbo => "gpt-3.5-turbo",
            KnownModel::Gpt4 => "gpt-4",
            KnownModel::Gpt4_32k => "gpt-4-32k",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gpt35Turbo)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{}", known_model),
            Model::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = Infallible;

    /// Parse a model identifier, falling back to `Model::Custom` for unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == s)
            .map(|known| Model::Known(*known))
            .unwrap_or_else(|| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::from(model.as_str())
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        let Ok(model) = model.parse::<Model>();
        model
    }
}
