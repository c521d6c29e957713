use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{FinishReason, Model, Turn};

/// The body of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// The model to sample from.
    pub model: Model,

    /// The system-prompt-prefixed conversation.
    pub messages: Vec<Turn>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Whether to stream the response as server-sent events.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// A complete (non-streaming) chat completion response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletion {
    /// Provider-assigned identifier.
    #[serde(default)]
    pub id: Option<String>,

    /// The model that produced the response.
    #[serde(default)]
    pub model: Option<String>,

    /// Candidate responses; llmo only ever asks for one.
    pub choices: Vec<Choice>,

    /// Token accounting, when the provider reports it.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One candidate response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Choice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The assistant turn.
    pub message: Turn,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// Token usage reported by the provider.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens in the completion.
    #[serde(default)]
    pub completion_tokens: u64,

    /// Sum of the two.
    #[serde(default)]
    pub total_tokens: u64,
}

impl ChatCompletion {
    /// Take the first choice's message as the assistant turn.
    pub fn into_turn(self) -> Result<Turn> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| Error::serialization("response contained no choices", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KnownModel, Role};
    use serde_json::{json, to_value};

    #[test]
    fn request_omits_stream_when_blocking() {
        let request = ChatCompletionRequest {
            model: Model::Known(KnownModel::Gpt35Turbo),
            messages: vec![Turn::system("be brief"), Turn::user("hi")],
            temperature: 0.5,
            stream: false,
        };
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                ],
                "temperature": 0.5,
            })
        );
    }

    #[test]
    fn request_sets_stream_flag() {
        let request = ChatCompletionRequest {
            model: Model::Custom("gpt-4o".to_string()),
            messages: vec![],
            temperature: 0.5,
            stream: true,
        };
        let value = to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["model"], json!("gpt-4o"));
    }

    #[test]
    fn completion_into_turn() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Python:\n```python\nprint('Hello, World!')\n```"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        }))
        .unwrap();
        assert_eq!(completion.usage.unwrap().total_tokens, 21);
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
        let turn = completion.into_turn().unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.content.starts_with("Python:"));
    }

    #[test]
    fn completion_without_choices_is_an_error() {
        let completion: ChatCompletion = serde_json::from_value(json!({"choices": []})).unwrap();
        let err = completion.into_turn().unwrap_err();
        assert!(err.is_service_error());
    }
}
