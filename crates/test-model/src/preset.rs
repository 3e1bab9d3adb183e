use ghidra_assistant_model::{ErrorKind, ToolCallRequest};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

impl PresetEvent {
    /// Creates a tool call event with raw, possibly malformed, arguments.
    #[inline]
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        PresetEvent::ToolCall(ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments: arguments.to_owned(),
        })
    }
}

/// How a scripted step fails before (or instead of) answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetFailure {
    /// The request is refused as if the backend were unreachable.
    Unavailable,
    /// The backend answers with a non-retryable error.
    Other,
}

impl PresetFailure {
    #[inline]
    pub(crate) fn kind(self) -> ErrorKind {
        match self {
            PresetFailure::Unavailable => ErrorKind::Unavailable,
            PresetFailure::Other => ErrorKind::Other,
        }
    }
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failures` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
    /// The way failing attempts fail.
    pub failure: PresetFailure,
    /// If set, the response errors out after delivering this many events.
    pub interrupt_after: Option<usize>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
            failure: PresetFailure::Unavailable,
            interrupt_after: None,
        }
    }

    /// Creates a text-only response, one delta per fragment.
    #[inline]
    pub fn with_text<'a>(fragments: impl IntoIterator<Item = &'a str>) -> Self {
        Self::with_events(
            fragments
                .into_iter()
                .map(|s| PresetEvent::MessageDelta(s.to_owned()))
                .collect::<Vec<_>>(),
        )
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Sets the way failing attempts fail.
    #[inline]
    pub fn with_failure(mut self, failure: PresetFailure) -> Self {
        self.failure = failure;
        self
    }

    /// Makes the response error out after `count` events were delivered.
    #[inline]
    pub fn interrupted_after(mut self, count: usize) -> Self {
        self.interrupt_after = Some(count);
        self
    }
}
