//! Logging hook for [`crate::OpenAi`] traffic.
//!
//! Install a [`ClientLogger`] with [`crate::OpenAi::with_logger`] to capture every completion and
//! every normalized stream event that passes through the client.

use crate::types::{ChatCompletion, StreamEvent};

/// A sink for completion traffic.
///
/// # Example
///
/// ```rust,ignore
/// use llmo::{ChatCompletion, ClientLogger, StreamEvent};
/// use std::sync::Mutex;
///
/// struct Transcript {
///     lines: Mutex<Vec<String>>,
/// }
///
/// impl ClientLogger for Transcript {
///     fn log_response(&self, completion: &ChatCompletion) {
///         self.lines.lock().unwrap().push(format!("{completion:?}"));
///     }
///
///     fn log_stream_event(&self, event: &StreamEvent) {
///         self.lines.lock().unwrap().push(format!("{event:?}"));
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Called once per successful blocking completion with the full response.
    fn log_response(&self, completion: &ChatCompletion);

    /// Called for every event parsed from a streaming completion.
    fn log_stream_event(&self, event: &StreamEvent);
}
