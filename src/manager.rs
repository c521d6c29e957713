//! The conversation manager: history, system prompt, budget, and both request modes.
//!
//! A [`ConversationManager`] owns one conversation.  Each call stages the requested files,
//! appends the prompt, evicts down to the token budget, prefixes the current system prompt, and
//! sends the lot to its [`CompletionService`].  [`ConversationManager::submit`] waits for the
//! whole answer.  [`ConversationManager::asubmit`] returns a [`ResponseStream`] of text fragments
//! that commits the assistant turn only once the service says the answer is finished.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::completion::{CompletionRequest, CompletionService, EventStream};
use crate::conversation::Conversation;
use crate::observability::{MANAGER_ABORTED_STREAMS, MANAGER_COMMITTED_TURNS};
use crate::system_prompt::SystemPrompt;
use crate::types::{FinishReason, Model, StreamEvent, Turn};
use crate::{Error, Result};

/// The default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// The largest sampling temperature the service accepts.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// The default token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 4097;

//////////////////////////////////////// ConversationManager ///////////////////////////////////////

/// Owns a conversation and talks to a completion service on its behalf.
///
/// Calls must be serialized; `asubmit` borrows the manager mutably until its stream is dropped.
pub struct ConversationManager<S> {
    service: S,
    conversation: Conversation,
    system_prompt: SystemPrompt,
    model: Model,
    temperature: f32,
    budget: Option<u32>,
}

impl<S: CompletionService> ConversationManager<S> {
    /// Create a manager with an empty conversation, the default system prompt without
    /// personality, the default model and temperature, and no budget.
    pub fn new(service: S) -> Self {
        Self {
            service,
            conversation: Conversation::new(),
            system_prompt: SystemPrompt::default(),
            model: Model::default(),
            temperature: DEFAULT_TEMPERATURE,
            budget: None,
        }
    }

    /// Use `model` for every request.
    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = model.into();
        self
    }

    /// Use `temperature` for every request.
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self> {
        self.set_temperature(temperature)?;
        Ok(self)
    }

    /// Evict history to stay within `budget` estimated tokens.
    pub fn with_budget(mut self, budget: Option<u32>) -> Self {
        self.budget = budget;
        self
    }

    /// Start with the personality enabled or disabled.
    pub fn with_personality(mut self, enabled: bool) -> Self {
        if enabled {
            self.system_prompt.add_personality();
        } else {
            self.system_prompt.remove_personality();
        }
        self
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: SystemPrompt) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    /// Send `prompt` and `files` and wait for the whole answer.
    ///
    /// The answer is appended to the conversation and its text returned.  If the service fails,
    /// the staged files and the prompt stay in the conversation.
    pub async fn submit(&mut self, prompt: &str, files: &[PathBuf]) -> Result<String> {
        let request = self.prepare(prompt, files).await?;
        let reply = self.service.complete(request).await?;
        let reply = Turn::assistant(reply.content);
        let text = reply.content.clone();
        self.conversation.push(reply);
        MANAGER_COMMITTED_TURNS.click();
        Ok(text)
    }

    /// Send `prompt` and `files` and stream the answer back in fragments.
    pub async fn asubmit(&mut self, prompt: &str, files: &[PathBuf]) -> Result<ResponseStream<'_>> {
        self.asubmit_with_cancellation(prompt, files, CancellationToken::new())
            .await
    }

    /// Like [`Self::asubmit`], but cancellable through `cancel` from the moment the request is
    /// dispatched.
    ///
    /// Cancelling before the service answers fails the call with [`Error::Aborted`]; cancelling
    /// afterward ends the returned stream without committing anything.
    pub async fn asubmit_with_cancellation(
        &mut self,
        prompt: &str,
        files: &[PathBuf],
        cancel: CancellationToken,
    ) -> Result<ResponseStream<'_>> {
        let request = self.prepare(prompt, files).await?;
        let events = tokio::select! {
            events = self.service.stream_complete(request) => events?,
            _ = cancel.cancelled() => {
                MANAGER_ABORTED_STREAMS.click();
                return Err(Error::aborted("request cancelled before the response started"));
            }
        };
        Ok(ResponseStream::new(&mut self.conversation, events, cancel))
    }

    /// Clear the conversation.  The system prompt and personality are untouched.
    pub fn reset(&mut self) {
        self.conversation.clear();
    }

    /// Enable the personality.
    pub fn add_personality(&mut self) {
        self.system_prompt.add_personality();
    }

    /// Disable the personality.
    pub fn remove_personality(&mut self) {
        self.system_prompt.remove_personality();
    }

    /// True if the personality is enabled.
    pub fn has_personality(&self) -> bool {
        self.system_prompt.has_personality()
    }

    /// The active system prompt text.
    pub fn system_prompt(&self) -> String {
        self.system_prompt.text()
    }

    /// The stored conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// A copy of the stored turns, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.conversation.to_vec()
    }

    /// The estimated token cost of the stored conversation.
    pub fn estimated_tokens(&self) -> f64 {
        self.conversation.estimated_tokens()
    }

    /// The model used for requests.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Change the model used for requests.
    pub fn set_model(&mut self, model: impl Into<Model>) {
        self.model = model.into();
    }

    /// The sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Change the sampling temperature.  It must lie in `0.0..=2.0`.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(Error::validation(
                format!("temperature must be between 0 and {MAX_TEMPERATURE}, got {temperature}"),
                Some("temperature".to_string()),
            ));
        }
        self.temperature = temperature;
        Ok(())
    }

    /// The token budget, if any.
    pub fn budget(&self) -> Option<u32> {
        self.budget
    }

    /// Change the token budget.  `None` disables eviction.
    pub fn set_budget(&mut self, budget: Option<u32>) {
        self.budget = budget;
    }

    /// The completion service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// The completion service, mutably.
    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Stage files and the prompt, evict, and build the request.
    ///
    /// Every file is read before the conversation is touched, so an unreadable file leaves the
    /// conversation as it was.
    async fn prepare(&mut self, prompt: &str, files: &[PathBuf]) -> Result<CompletionRequest> {
        let mut staged = Vec::with_capacity(files.len());
        for path in files {
            staged.push((file_label(path), read_file(path).await?));
        }
        for (label, text) in &staged {
            self.conversation.stage_file(label, text);
        }
        self.conversation.push(Turn::user(prompt));
        self.conversation.evict_to_budget(self.budget);

        let mut turns = Vec::with_capacity(self.conversation.len() + 1);
        turns.push(Turn::system(self.system_prompt.text()));
        turns.extend(self.conversation.iter().cloned());
        tracing::debug!(
            turns = turns.len(),
            files = staged.len(),
            estimated_tokens = self.conversation.estimated_tokens(),
            model = %self.model,
            "prepared completion request"
        );
        Ok(CompletionRequest::new(
            turns,
            self.model.clone(),
            self.temperature,
        ))
    }
}

/// The identifier a file is quoted under in its file turn.
pub fn file_label(path: &Path) -> String {
    path.display().to_string()
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| Error::file_unreadable(path, err))
}

/////////////////////////////////////////// StreamState ////////////////////////////////////////////

/// Where a streaming call is in its life.
///
/// A manager with no [`ResponseStream`] alive is idle; the borrow checker guarantees there is at
/// most one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// The request is dispatched and no event has arrived yet.
    Sending,

    /// Events are arriving.
    Streaming,

    /// The finish marker arrived and the assistant turn was appended.
    Committed,

    /// The stream was cancelled or failed and the partial turn was discarded.
    Aborted,
}

impl StreamState {
    /// True once the stream can yield nothing more.
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Committed | StreamState::Aborted)
    }
}

////////////////////////////////////////// ResponseStream //////////////////////////////////////////

/// The fragments of one streamed answer.
///
/// Each item is a piece of the assistant's text.  The concatenation of every fragment equals the
/// assistant turn committed to history when the finish marker arrives.  If the stream is
/// cancelled, fails, or is dropped before then, nothing is committed.
pub struct ResponseStream<'a> {
    history: &'a mut Conversation,
    events: EventStream,
    reply: String,
    state: StreamState,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<'a> ResponseStream<'a> {
    fn new(history: &'a mut Conversation, events: EventStream, cancel: CancellationToken) -> Self {
        let cancelled = Box::pin(cancel.clone().cancelled_owned());
        Self {
            history,
            events,
            reply: String::new(),
            state: StreamState::Sending,
            cancel,
            cancelled,
        }
    }

    /// Where this stream is in its life.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// A token that cancels this stream from elsewhere, such as an interrupt handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the stream.  The next poll ends it without committing anything.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The text received so far.
    pub fn partial_text(&self) -> &str {
        &self.reply
    }

    /// Drain the stream and return the committed text.
    ///
    /// Fails with [`Error::Aborted`] if the stream was cancelled first.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        match self.state {
            StreamState::Committed => Ok(text),
            _ => Err(Error::aborted("response stream was cancelled")),
        }
    }

    fn commit(&mut self, reason: FinishReason) {
        let reply = std::mem::take(&mut self.reply);
        tracing::debug!(reason = %reason, chars = reply.len(), "committing streamed reply");
        self.history.push(Turn::assistant(reply));
        self.state = StreamState::Committed;
        MANAGER_COMMITTED_TURNS.click();
    }

    fn abort(&mut self, why: &str) {
        tracing::debug!(
            why,
            discarded_chars = self.reply.len(),
            "discarding streamed reply"
        );
        self.reply.clear();
        self.state = StreamState::Aborted;
        MANAGER_ABORTED_STREAMS.click();
    }
}

impl Stream for ResponseStream<'_> {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.state.is_terminal() {
                return Poll::Ready(None);
            }
            if this.cancelled.as_mut().poll(cx).is_ready() {
                this.abort("cancelled");
                return Poll::Ready(None);
            }
            match this.events.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    this.state = StreamState::Streaming;
                    match event {
                        StreamEvent::Role(_) => continue,
                        StreamEvent::Delta(delta) => {
                            this.reply.push_str(&delta);
                            return Poll::Ready(Some(Ok(delta)));
                        }
                        StreamEvent::Finish(reason) => {
                            this.commit(reason);
                            return Poll::Ready(None);
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.abort("stream error");
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.abort("stream ended early");
                    return Poll::Ready(Some(Err(Error::streaming(
                        "stream ended without a finish marker",
                        None,
                    ))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ResponseStream<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.abort("dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::system_prompt::{DEFAULT_SYSTEM_PROMPT, PERSONALITY_PROMPT};
    use crate::types::{KnownModel, Role, estimate_tokens};

    enum Script {
        Reply(&'static str),
        Fail(Error),
        Events(Vec<Result<StreamEvent>>),
        Hang(Vec<StreamEvent>),
    }

    #[derive(Default)]
    struct ScriptedService {
        script: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedService {
        fn new(script: impl IntoIterator<Item = Script>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next(&self, request: CompletionRequest) -> Script {
            self.requests.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl CompletionService for ScriptedService {
        async fn complete(&self, request: CompletionRequest) -> Result<Turn> {
            match self.next(request) {
                Script::Reply(text) => Ok(Turn::assistant(text)),
                Script::Fail(err) => Err(err),
                _ => panic!("streaming script used for complete"),
            }
        }

        async fn stream_complete(&self, request: CompletionRequest) -> Result<EventStream> {
            match self.next(request) {
                Script::Events(events) => Ok(Box::pin(stream::iter(events))),
                Script::Hang(events) => Ok(Box::pin(
                    stream::iter(events.into_iter().map(Ok::<_, Error>)).chain(stream::pending()),
                )),
                Script::Fail(err) => Err(err),
                Script::Reply(_) => panic!("complete script used for stream_complete"),
            }
        }
    }

    fn deltas(parts: &[&str]) -> Vec<Result<StreamEvent>> {
        let mut events = vec![Ok(StreamEvent::Role(Role::Assistant))];
        events.extend(parts.iter().map(|p| Ok(StreamEvent::Delta(p.to_string()))));
        events.push(Ok(StreamEvent::Finish(FinishReason::Stop)));
        events
    }

    fn temp_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn submit_records_exchange() {
        let service = ScriptedService::new([Script::Reply("Hello!")]);
        let mut manager = ConversationManager::new(service).with_model(KnownModel::Gpt4);
        let reply = manager.submit("Hi", &[]).await.unwrap();
        assert_eq!(reply, "Hello!");
        assert_eq!(manager.turns(), vec![Turn::user("Hi"), Turn::assistant("Hello!")]);

        let requests = manager.service().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].turns,
            vec![Turn::system(DEFAULT_SYSTEM_PROMPT), Turn::user("Hi")]
        );
        assert_eq!(requests[0].model, Model::Known(KnownModel::Gpt4));
        assert_eq!(requests[0].temperature, DEFAULT_TEMPERATURE);
    }

    #[tokio::test]
    async fn system_prompt_is_never_stored() {
        let service = ScriptedService::new([Script::Reply("a"), Script::Reply("b")]);
        let mut manager = ConversationManager::new(service);
        manager.submit("one", &[]).await.unwrap();
        manager.add_personality();
        manager.submit("two", &[]).await.unwrap();
        assert!(manager.turns().iter().all(|t| t.role != Role::System));

        let requests = manager.service().requests();
        assert_eq!(requests[0].turns[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(
            requests[1].turns[0].content,
            format!("{DEFAULT_SYSTEM_PROMPT} {PERSONALITY_PROMPT}")
        );
        assert_eq!(requests[1].turns.len(), 4);
    }

    #[tokio::test]
    async fn personality_toggles_are_idempotent() {
        let mut manager = ConversationManager::new(ScriptedService::default());
        manager.add_personality();
        manager.add_personality();
        assert!(manager.has_personality());
        assert_eq!(
            manager.system_prompt(),
            format!("{DEFAULT_SYSTEM_PROMPT} {PERSONALITY_PROMPT}")
        );
        manager.remove_personality();
        manager.remove_personality();
        assert!(!manager.has_personality());
        assert_eq!(manager.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn restaged_file_supersedes_old_copy() {
        let file = temp_file("v1");
        let path = file.path().to_path_buf();
        let label = file_label(&path);
        let service = ScriptedService::new([Script::Reply("a"), Script::Reply("b")]);
        let mut manager = ConversationManager::new(service);
        manager.submit("first", &[path.clone()]).await.unwrap();
        std::fs::write(&path, "v2").unwrap();
        manager.submit("second", &[path.clone()]).await.unwrap();

        let file_turns: Vec<_> = manager
            .turns()
            .into_iter()
            .filter(|t| t.is_file_turn_for(&label))
            .collect();
        assert_eq!(file_turns, vec![Turn::file(&label, "v2")]);
        let contents: Vec<_> = manager.turns().into_iter().map(|t| t.content).collect();
        assert_eq!(
            contents,
            vec![
                "first".to_string(),
                "a".to_string(),
                Turn::file(&label, "v2").content,
                "second".to_string(),
                "b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unreadable_file_fails_before_any_request() {
        let good = temp_file("fine");
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let service = ScriptedService::new([Script::Reply("unused")]);
        let mut manager = ConversationManager::new(service);
        let err = manager
            .submit("hi", &[good.path().to_path_buf(), missing])
            .await
            .unwrap_err();
        assert!(err.is_file_unreadable());
        assert!(manager.turns().is_empty());
        assert!(manager.service().requests().is_empty());
    }

    #[tokio::test]
    async fn service_failure_keeps_appended_turns() {
        let file = temp_file("context");
        let service = ScriptedService::new([Script::Fail(Error::rate_limit("slow down", None))]);
        let mut manager = ConversationManager::new(service);
        let err = manager
            .submit("hi", &[file.path().to_path_buf()])
            .await
            .unwrap_err();
        assert!(err.is_service_error());
        let turns = manager.turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[0].is_file_turn());
        assert_eq!(turns[1], Turn::user("hi"));
    }

    #[tokio::test]
    async fn budget_evicts_file_turn_before_sending() {
        let file = temp_file(&"f".repeat(80));
        let prompt = "p".repeat(23);
        assert!(estimate_tokens(&prompt) <= 5.0);
        let service = ScriptedService::new([Script::Reply(
            "a considerably longer answer that is appended regardless of the budget",
        )]);
        let mut manager = ConversationManager::new(service).with_budget(Some(5));
        manager
            .submit(&prompt, &[file.path().to_path_buf()])
            .await
            .unwrap();

        let requests = manager.service().requests();
        assert_eq!(
            requests[0].turns,
            vec![Turn::system(DEFAULT_SYSTEM_PROMPT), Turn::user(prompt.clone())]
        );
        let turns = manager.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user(prompt));
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(manager.estimated_tokens() > 5.0);
    }

    #[tokio::test]
    async fn reset_clears_history_only() {
        let service = ScriptedService::new([
            Script::Reply("a"),
            Script::Reply("b"),
            Script::Reply("c"),
        ]);
        let mut manager = ConversationManager::new(service).with_personality(true);
        for prompt in ["one", "two", "three"] {
            manager.submit(prompt, &[]).await.unwrap();
        }
        assert_eq!(manager.turns().len(), 6);
        let prompt = manager.system_prompt();

        manager.reset();
        assert!(manager.turns().is_empty());
        assert!(manager.has_personality());
        assert_eq!(manager.system_prompt(), prompt);
        assert_eq!(
            manager.system_prompt(),
            format!("{DEFAULT_SYSTEM_PROMPT} {PERSONALITY_PROMPT}")
        );
    }

    #[tokio::test]
    async fn temperature_is_validated() {
        let mut manager = ConversationManager::new(ScriptedService::default());
        assert!(manager.set_temperature(2.5).unwrap_err().is_validation());
        assert!(manager.set_temperature(-0.1).unwrap_err().is_validation());
        assert!(manager.set_temperature(f32::NAN).is_err());
        manager.set_temperature(0.0).unwrap();
        manager.set_temperature(2.0).unwrap();
        assert_eq!(manager.temperature(), 2.0);
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_committed_turn() {
        let service = ScriptedService::new([Script::Events(deltas(&["Hel", "lo", ", ", "world"]))]);
        let mut manager = ConversationManager::new(service);
        let mut stream = manager.asubmit("Hi", &[]).await.unwrap();
        assert_eq!(stream.state(), StreamState::Sending);
        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(stream.state(), StreamState::Committed);
        drop(stream);

        assert_eq!(fragments, vec!["Hel", "lo", ", ", "world"]);
        assert_eq!(
            manager.turns(),
            vec![Turn::user("Hi"), Turn::assistant(fragments.concat())]
        );
    }

    #[tokio::test]
    async fn nothing_is_yielded_after_finish() {
        let mut events = deltas(&["done"]);
        events.push(Ok(StreamEvent::Delta("late".to_string())));
        let service = ScriptedService::new([Script::Events(events)]);
        let mut manager = ConversationManager::new(service);
        let text = manager
            .asubmit("Hi", &[])
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "done");
        assert_eq!(manager.turns()[1], Turn::assistant("done"));
    }

    #[tokio::test]
    async fn cancelled_stream_commits_nothing() {
        let service = ScriptedService::new([Script::Hang(vec![
            StreamEvent::Role(Role::Assistant),
            StreamEvent::Delta("partial".to_string()),
        ])]);
        let mut manager = ConversationManager::new(service);
        let mut stream = manager.asubmit("Hi", &[]).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert_eq!(stream.state(), StreamState::Streaming);
        stream.cancellation_token().cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Aborted);
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn cancel_ends_stream_without_commit() {
        let service = ScriptedService::new([Script::Hang(vec![StreamEvent::Delta(
            "partial".to_string(),
        )])]);
        let mut manager = ConversationManager::new(service);
        let mut stream = manager.asubmit("Hi", &[]).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        stream.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Aborted);
        assert_eq!(stream.partial_text(), "");
        drop(stream);
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn dropped_stream_commits_nothing() {
        let service = ScriptedService::new([Script::Events(deltas(&["a", "b"]))]);
        let mut manager = ConversationManager::new(service);
        {
            let mut stream = manager.asubmit("Hi", &[]).await.unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        }
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn cancelling_before_response_aborts_call() {
        let service = ScriptedService::new([Script::Events(deltas(&["unused"]))]);
        let mut manager = ConversationManager::new(service);
        let cancel = CancellationToken::new();
        cancel.cancel();
        // the scripted service answers immediately, so either branch may win
        match manager
            .asubmit_with_cancellation("Hi", &[], cancel)
            .await
        {
            Ok(stream) => {
                let err = stream.collect_text().await.unwrap_err();
                assert!(err.is_aborted());
            }
            Err(err) => assert!(err.is_aborted()),
        }
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn stream_without_finish_is_an_error() {
        let service = ScriptedService::new([Script::Events(vec![
            Ok(StreamEvent::Delta("half".to_string())),
        ])]);
        let mut manager = ConversationManager::new(service);
        let mut stream = manager.asubmit("Hi", &[]).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "half");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_service_error());
        assert_eq!(stream.state(), StreamState::Aborted);
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn stream_error_discards_partial_turn() {
        let service = ScriptedService::new([Script::Events(vec![
            Ok(StreamEvent::Delta("par".to_string())),
            Err(Error::internal_server("boom")),
            Ok(StreamEvent::Finish(FinishReason::Stop)),
        ])]);
        let mut manager = ConversationManager::new(service);
        let err = manager
            .asubmit("Hi", &[])
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();
        assert!(err.is_service_error());
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }

    #[tokio::test]
    async fn stream_request_failure_keeps_prompt() {
        let service = ScriptedService::new([Script::Fail(Error::authentication("bad key"))]);
        let mut manager = ConversationManager::new(service);
        let err = manager.asubmit("Hi", &[]).await.err().unwrap();
        assert!(err.is_authentication());
        assert_eq!(manager.turns(), vec![Turn::user("Hi")]);
    }
}
