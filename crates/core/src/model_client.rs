use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use backoff::backoff::Backoff;
use ghidra_assistant_model::{
    ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ModelTool,
};
use tracing::Instrument;

use crate::Error;

type DynError = Box<dyn ModelProviderError>;
type SendRequestResult = Result<Box<dyn DynResponse>, DynError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// How often and how patiently a tool-enabled completion is retried.
///
/// Only errors whose kind is transient (the backend being unavailable) are
/// retried, every other error fails the completion right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    /// Fixed delay between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff(self) -> BoundedConstantBackoff {
        BoundedConstantBackoff {
            policy: self,
            retries_left: self.max_attempts.saturating_sub(1),
        }
    }
}

struct BoundedConstantBackoff {
    policy: RetryPolicy,
    retries_left: u32,
}

impl Backoff for BoundedConstantBackoff {
    fn reset(&mut self) {
        self.retries_left = self.policy.max_attempts.saturating_sub(1);
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self.policy.delay)
    }
}

trait DynResponse: Send + Unpin {
    fn poll_next_event(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, DynError>>;
}

impl<R: ModelResponse> DynResponse for Pin<Box<R>> {
    #[inline]
    fn poll_next_event(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, DynError>> {
        ModelResponse::poll_next_event(self.as_mut(), cx)
            .map_err(|err| Box::new(err) as DynError)
    }
}

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("sending a request: {req:?}");
                    match fut.await {
                        Ok(resp) => {
                            Ok(Box::new(Box::pin(resp)) as Box<dyn DynResponse>)
                        }
                        Err(err) => Err(Box::new(err) as DynError),
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Requests a complete, tool-enabled assistant message.
    ///
    /// The request is retried according to the [`RetryPolicy`] while the
    /// backend is unavailable.
    pub async fn complete(
        &self,
        messages: Vec<ModelMessage>,
        tools: Vec<ModelTool>,
    ) -> Result<ModelMessage, Error> {
        let req = ModelRequest {
            messages,
            tools,
            stream: false,
        };

        let mut attempts = 0u32;
        let result = backoff::future::retry_notify(
            self.retry_policy.backoff(),
            || {
                attempts += 1;
                let fut = (self.handler_fn)(req.clone());
                async move {
                    match fut.await {
                        Ok(resp) => collect_message(resp).await.map_err(classify),
                        Err(err) => Err(classify(err)),
                    }
                }
            },
            |err: DynError, delay: Duration| {
                warn!("model backend unavailable ({err}), retrying in {delay:?}");
            },
        )
        .await;

        result.map_err(|err| {
            if err.kind().is_transient() {
                error!("giving up after {attempts} attempts: {err}");
                Error::ModelUnavailable {
                    attempts,
                    reason: err.to_string(),
                }
            } else {
                error!("model request failed: {err}");
                Error::from_provider(&*err)
            }
        })
    }

    /// Starts a streamed completion without tools.
    ///
    /// Streams are never retried, a failure surfaces from
    /// [`ModelStream::next_delta`] instead.
    pub async fn stream(
        &self,
        messages: Vec<ModelMessage>,
    ) -> Result<ModelStream, Error> {
        let req = ModelRequest {
            messages,
            tools: vec![],
            stream: true,
        };
        match (self.handler_fn)(req).await {
            Ok(resp) => Ok(ModelStream { resp }),
            Err(err) => {
                error!("failed to start streaming: {err}");
                Err(Error::from_provider(&*err))
            }
        }
    }
}

/// The text fragments of a streamed completion.
pub struct ModelStream {
    resp: Box<dyn DynResponse>,
}

impl ModelStream {
    /// Waits for the next text fragment, `None` means the stream is done.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe.
    pub async fn next_delta(&mut self) -> Result<Option<String>, Error> {
        loop {
            let event = poll_fn(|cx| self.resp.poll_next_event(cx))
                .await
                .map_err(|err| {
                    error!("stream interrupted: {err}");
                    Error::from_provider(&*err)
                })?;
            match event {
                Some(ModelResponseEvent::MessageDelta(delta)) => {
                    return Ok(Some(delta));
                }
                Some(ModelResponseEvent::ToolCall(req)) => {
                    warn!("ignoring tool call in a streamed answer: {req:?}");
                }
                Some(ModelResponseEvent::Completed(reason)) => {
                    trace!("stream completed: {reason:?}");
                }
                None => return Ok(None),
            }
        }
    }
}

fn classify(err: DynError) -> backoff::Error<DynError> {
    if err.kind().is_transient() {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

async fn collect_message(
    mut resp: Box<dyn DynResponse>,
) -> Result<ModelMessage, DynError> {
    let mut content = String::new();
    let mut tool_calls = vec![];

    trace!("start receiving events");
    while let Some(event) = poll_fn(|cx| resp.poll_next_event(cx)).await? {
        trace!("got an event: {event:?}");
        match event {
            ModelResponseEvent::MessageDelta(delta) => content.push_str(&delta),
            ModelResponseEvent::ToolCall(req) => tool_calls.push(req),
            ModelResponseEvent::Completed(reason) => {
                trace!("finished a request: {reason:?}");
            }
        }
    }

    Ok(ModelMessage::Assistant {
        content: (!content.is_empty()).then_some(content),
        tool_calls,
    })
}
