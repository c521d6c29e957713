// Public modules
pub mod chat_completion;
pub mod chunk;
pub mod finish_reason;
pub mod model;
pub mod turn;

// Re-exports
pub use chat_completion::{ChatCompletion, ChatCompletionRequest, Choice, Usage};
pub use chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta, StreamEvent};
pub use finish_reason::FinishReason;
pub use model::{KnownModel, Model};
pub use turn::{CHARS_PER_TOKEN, Role, Turn, estimate_tokens};
