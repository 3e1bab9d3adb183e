//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use ghidra_assistant_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    interrupt_after: Option<usize>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        if this.interrupt_after == Some(this.event_idx) {
            this.interrupt_after = None;
            return Poll::Ready(Err(Error {
                message: "response interrupted",
                kind: ErrorKind::Other,
            }));
        }

        let event = if let Some(event) = this.events.get(this.event_idx) {
            match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            }
        } else if this.event_idx == this.events.len() {
            let has_tool_call = this
                .events
                .iter()
                .any(|event| matches!(event, PresetEvent::ToolCall(_)));
            ModelResponseEvent::Completed(if has_tool_call {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            })
        } else {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        };
        this.event_idx += 1;
        Poll::Ready(Ok(Some(event)))
    }
}

#[derive(Default)]
struct Script {
    steps: Vec<PresetResponse>,
    cursor: usize,
    failed_attempts: u64,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is the
/// ordered list of responses the model gives. Every successful request
/// consumes the next step; a step configured with failures is retried in
/// place until its failures are used up. If there are no enough steps in
/// the script, an error will be returned.
///
/// Clones share the same script, so a test can keep one clone around to
/// inspect the requests that were received.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response_step(&mut self, preset: PresetResponse) {
        self.lock().steps.push(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, failed attempts included.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of steps that have been answered successfully.
    pub fn consumed_steps(&self) -> usize {
        self.lock().cursor
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(step) = script.steps.get(script.cursor).cloned() else {
            return ready(Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            }));
        };

        if let Some(failures) = step.failures {
            if failures == 0 || script.failed_attempts < failures {
                script.failed_attempts += 1;
                return ready(Err(Error {
                    message: "scripted failure",
                    kind: step.failure.kind(),
                }));
            }
        }
        script.failed_attempts = 0;
        script.cursor += 1;

        ready(Ok(TestModelResponse {
            events: step.events,
            interrupt_after: step.interrupt_after,
            event_idx: 0,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        }))
    }
}
