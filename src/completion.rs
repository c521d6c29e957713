//! The contract between the conversation manager and the remote model.
//!
//! [`crate::OpenAi`] is the production implementation.  Anything that can turn an ordered list of
//! turns into an assistant turn, whole or as a stream of [`StreamEvent`]s, can stand in for it.

use std::pin::Pin;

use futures::Stream;

use crate::error::{Error, Result};
use crate::types::{ChatCompletionRequest, Model, StreamEvent, Turn};

/// A boxed stream of events from a streaming completion.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Everything the completion service needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System-prompt-prefixed turns, oldest first.
    pub turns: Vec<Turn>,

    /// The model to sample from.
    pub model: Model,

    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Create a new request.
    pub fn new(turns: Vec<Turn>, model: Model, temperature: f32) -> Self {
        Self {
            turns,
            model,
            temperature,
        }
    }

    /// Convert into the chat completions wire body.
    pub fn into_wire(self, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model,
            messages: self.turns,
            temperature: self.temperature,
            stream,
        }
    }
}

/// A remote chat-completion endpoint.
///
/// Timeouts and retries, if any, are the implementation's business.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a single complete assistant turn.
    async fn complete(&self, request: CompletionRequest) -> Result<Turn>;

    /// Request the assistant turn as a stream of events.
    ///
    /// The stream should end with a [`StreamEvent::Finish`].
    async fn stream_complete(&self, request: CompletionRequest) -> Result<EventStream>;

    /// Replace the credential used for later calls.
    ///
    /// Services without a credential reject this.
    fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        _ = api_key;
        Err(Error::validation(
            "this completion service does not take an API key",
            Some("api_key".to_string()),
        ))
    }
}

#[async_trait::async_trait]
impl<S: CompletionService + ?Sized> CompletionService for Box<S> {
    async fn complete(&self, request: CompletionRequest) -> Result<Turn> {
        (**self).complete(request).await
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<EventStream> {
        (**self).stream_complete(request).await
    }

    fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        (**self).set_api_key(api_key)
    }
}
