use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("llmo.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("llmo.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("llmo.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("llmo.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("llmo.stream.errors");
pub(crate) static STREAM_MALFORMED: Counter = Counter::new("llmo.stream.malformed");
pub(crate) static STREAM_BYTES: Counter = Counter::new("llmo.stream.bytes");

pub(crate) static CONVERSATION_EVICTED_TURNS: Counter =
    Counter::new("llmo.conversation.evicted_turns");
pub(crate) static CONVERSATION_EVICTED_FILE_TURNS: Counter =
    Counter::new("llmo.conversation.evicted_file_turns");
pub(crate) static CONVERSATION_SUPERSEDED_FILE_TURNS: Counter =
    Counter::new("llmo.conversation.superseded_file_turns");

pub(crate) static MANAGER_COMMITTED_TURNS: Counter = Counter::new("llmo.manager.committed_turns");
pub(crate) static MANAGER_ABORTED_STREAMS: Counter = Counter::new("llmo.manager.aborted_streams");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_MALFORMED);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&CONVERSATION_EVICTED_TURNS);
    collector.register_counter(&CONVERSATION_EVICTED_FILE_TURNS);
    collector.register_counter(&CONVERSATION_SUPERSEDED_FILE_TURNS);

    collector.register_counter(&MANAGER_COMMITTED_TURNS);
    collector.register_counter(&MANAGER_ABORTED_STREAMS);
}
