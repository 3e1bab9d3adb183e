//! Events delivered to the caller while a conversation runs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A progress or output notification for the caller.
///
/// Serialized as a JSON object tagged by `type`, e.g.
/// `{"type":"token","content":"Hello"}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A tool is about to run.
    ToolCall {
        /// Human-readable label of the tool.
        description: String,
    },
    /// A fragment of the final answer.
    Token {
        /// The text fragment.
        content: String,
    },
    /// The conversation failed. Always the last event of a run.
    Error {
        /// Human-readable failure description.
        content: String,
    },
}

impl Event {
    /// Creates a [`Event::ToolCall`].
    #[inline]
    pub fn tool_call<S: Into<String>>(description: S) -> Self {
        Event::ToolCall {
            description: description.into(),
        }
    }

    /// Creates a [`Event::Token`].
    #[inline]
    pub fn token<S: Into<String>>(content: S) -> Self {
        Event::Token {
            content: content.into(),
        }
    }

    /// Creates a [`Event::Error`].
    #[inline]
    pub fn error<S: Into<String>>(content: S) -> Self {
        Event::Error {
            content: content.into(),
        }
    }

    /// Returns `true` for [`Event::Error`].
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

/// The receiver has been dropped, nobody is listening anymore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("event receiver has been dropped")]
pub struct Disconnected;

/// The sending half of an event channel.
///
/// Dropping the matching [`EventReceiver`] is how a caller cancels a run.
#[derive(Clone, Debug)]
pub struct EventSender {
    inner: mpsc::Sender<Event>,
}

/// The receiving half of an event channel.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Creates a bounded event channel.
///
/// A slow receiver applies back-pressure on the conversation instead of
/// letting events pile up.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { inner: tx }, rx)
}

impl EventSender {
    /// Delivers an event, waiting for capacity if the receiver lags behind.
    pub async fn emit(&self, event: Event) -> Result<(), Disconnected> {
        trace!("emitting event: {event:?}");
        self.inner.send(event).await.map_err(|_| Disconnected)
    }

    /// Returns `true` once the receiver has been dropped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Completes when the receiver has been dropped.
    pub async fn closed(&self) {
        self.inner.closed().await
    }
}
