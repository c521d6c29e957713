//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of a `stream: true` chat completion response into the
//! normalized [`StreamEvent`]s the conversation manager consumes.  Each SSE frame carries one
//! `data:` payload: either a JSON chunk, an error object, or the `[DONE]` sentinel.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS, STREAM_MALFORMED};
use crate::types::{ChatCompletionChunk, StreamEvent};
use crate::{Error, Result};

const DONE: &str = "[DONE]";

struct SseState<S> {
    stream: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent>>,
    done: bool,
}

/// What one SSE frame turned out to hold.
#[derive(Debug)]
enum Frame {
    Events(Vec<StreamEvent>),
    Error(Error),
    Done,
    Skip,
}

/// Process a stream of bytes into a stream of chat completion events.
///
/// Frames that cannot be understood are logged and skipped; transport failures are yielded as
/// errors and end the stream.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    let state = SseState {
        stream: byte_stream,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_ok() {
                    STREAM_EVENTS.click();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            if let Some(frame) = split_frame(&mut state.buffer) {
                state.apply(parse_frame(&frame));
                continue;
            }

            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.buffer.extend(bytes.iter().filter(|b| **b != b'\r'));
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.done = true;
                    return Some((
                        Err(Error::streaming(
                            format!("Error in HTTP stream: {e}"),
                            Some(Box::new(e)),
                        )),
                        state,
                    ));
                }
                None => {
                    // The last frame may arrive without its blank line.
                    let rest = std::mem::take(&mut state.buffer);
                    if !rest.iter().all(u8::is_ascii_whitespace) {
                        state.apply(parse_frame(&rest));
                    }
                    state.done = true;
                }
            }
        }
    })
}

impl<S> SseState<S> {
    fn apply(&mut self, frame: Frame) {
        match frame {
            Frame::Events(events) => self.pending.extend(events.into_iter().map(Ok)),
            Frame::Error(err) => {
                STREAM_ERRORS.click();
                self.pending.push_back(Err(err));
                self.done = true;
            }
            Frame::Done => self.done = true,
            Frame::Skip => {}
        }
    }
}

/// Remove and return the first complete frame in `buffer`, if there is one.
fn split_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buffer.windows(2).position(|w| w == b"\n\n")?;
    let frame = buffer[..pos].to_vec();
    buffer.drain(..pos + 2);
    Some(frame)
}

/// Interpret one frame.
///
/// Multiple `data:` lines are joined with newlines; `event:`, `id:`, and comment lines are
/// ignored.
fn parse_frame(frame: &[u8]) -> Frame {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            return Frame::Error(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ));
        }
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        return Frame::Skip;
    }
    let data = data.join("\n");
    if data.trim() == DONE {
        return Frame::Done;
    }

    let value: serde_json::Value = match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            STREAM_MALFORMED.click();
            tracing::warn!(error = %e, data = %data, "ignoring malformed stream chunk");
            return Frame::Skip;
        }
    };
    if let Some(error) = value.get("error") {
        return Frame::Error(stream_error(error));
    }
    match serde_json::from_value::<ChatCompletionChunk>(value) {
        Ok(chunk) => Frame::Events(chunk.into_events()),
        Err(e) => {
            STREAM_MALFORMED.click();
            tracing::warn!(error = %e, data = %data, "ignoring unrecognized stream chunk");
            Frame::Skip
        }
    }
}

fn stream_error(error: &serde_json::Value) -> Error {
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    let detail = ErrorDetail::deserialize(error).ok();
    let error_type = detail
        .as_ref()
        .and_then(|d| d.error_type.clone())
        .or_else(|| Some("stream_error".to_string()));
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| error.to_string());
    Error::api(500, error_type, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishReason, Role};
    use futures::stream;

    async fn collect(chunks: &[&'static [u8]]) -> Vec<Result<StreamEvent>> {
        let chunks: Vec<&'static [u8]> = chunks.to_vec();
        let stream = Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ));
        process_sse(stream).collect().await
    }

    fn events(items: Vec<Result<StreamEvent>>) -> Vec<StreamEvent> {
        items.into_iter().map(|item| item.unwrap()).collect()
    }

    #[tokio::test]
    async fn parse_full_response() {
        let items = collect(&[
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":null}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            b"data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            events(items),
            vec![
                StreamEvent::Role(Role::Assistant),
                StreamEvent::Delta("Hello".to_string()),
                StreamEvent::Delta(" world".to_string()),
                StreamEvent::Finish(FinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn handle_split_event() {
        let items = collect(&[
            b"data: {\"choices\":[{\"delta\":",
            b"{\"content\":\"Hi\"}}]}\n",
            b"\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(events(items), vec![StreamEvent::Delta("Hi".to_string())]);
    }

    #[tokio::test]
    async fn handle_crlf_framing() {
        let items = collect(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n",
            b"data: [DONE]\r\n\r\n",
        ])
        .await;
        assert_eq!(events(items), vec![StreamEvent::Delta("a".to_string())]);
    }

    #[tokio::test]
    async fn handle_multibyte_split_across_chunks() {
        // "é" is 0xC3 0xA9
        let items = collect(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xC3",
            b"\xA9\"}}]}\n\n",
        ])
        .await;
        assert_eq!(events(items), vec![StreamEvent::Delta("café".to_string())]);
    }

    #[tokio::test]
    async fn nothing_after_done() {
        let items = collect(&[
            b"data: [DONE]\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ])
        .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let items = collect(&[
            b"data: {not json}\n\n",
            b": keep-alive comment\n\n",
            b"event: something\n\n",
            b"data: {\"choices\":[{\"delta\":{\"role\":\"tool\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        ])
        .await;
        assert_eq!(events(items), vec![StreamEvent::Delta("ok".to_string())]);
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line() {
        let items = collect(&[
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}",
        ])
        .await;
        assert_eq!(
            events(items),
            vec![StreamEvent::Finish(FinishReason::Stop)]
        );
    }

    #[tokio::test]
    async fn error_payload_ends_stream() {
        let items = collect(&[
            b"data: {\"error\":{\"type\":\"server_error\",\"message\":\"overloaded\"}}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ])
        .await;
        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert!(err.is_service_error());
        assert_eq!(err.to_string(), "server_error: overloaded");
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let items = collect(&[b"data: \xFF\xFE\n\n"]).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Encoding { .. })));
    }
}
