mod builder;
mod stage;

use std::sync::Arc;

use tracing::Instrument;

use crate::Error;
use crate::conversation::ConversationState;
use crate::event::{Disconnected, Event, EventSender};
use crate::model_client::ModelClient;
use crate::tool::{ToolCatalog, ToolDispatcher};
pub use builder::{DEFAULT_TURN_BUDGET, OrchestratorBuilder};
use stage::Stage;

/// A question about one analysis job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatRequest {
    /// The user's question.
    pub message: String,
    /// The job every tool call is scoped to.
    pub job_id: String,
}

impl ChatRequest {
    /// Creates a new request.
    #[inline]
    pub fn new<M: Into<String>, J: Into<String>>(message: M, job_id: J) -> Self {
        Self {
            message: message.into(),
            job_id: job_id.into(),
        }
    }
}

/// Drives conversations between the user, the model and the tools.
///
/// Each run alternates between asking the model for tool calls and
/// executing them, until the model stops asking or the turn budget is
/// spent. The final answer is then streamed to the caller token by token.
///
/// The orchestrator itself holds no per-conversation state, so it can be
/// cloned cheaply and shared by concurrent runs.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    model_client: ModelClient,
    dispatcher: ToolDispatcher,
    system_prompt: String,
    turn_budget: usize,
}

/// Why a run stopped before reaching [`Stage::Done`].
enum Halt {
    Disconnected,
    Failed(Error),
}

impl From<Disconnected> for Halt {
    #[inline]
    fn from(_: Disconnected) -> Self {
        Halt::Disconnected
    }
}

impl From<Error> for Halt {
    #[inline]
    fn from(err: Error) -> Self {
        Halt::Failed(err)
    }
}

impl Orchestrator {
    #[inline]
    fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the tools the model may call.
    #[inline]
    pub fn catalog(&self) -> &ToolCatalog {
        self.inner.dispatcher.catalog()
    }

    /// Runs a conversation to completion, reporting progress to `events`.
    ///
    /// Failures are reported as a single [`Event::Error`], which is always
    /// the last event of the run. Dropping the receiving end of `events`
    /// stops the run at the next step.
    pub async fn run(&self, request: ChatRequest, events: EventSender) {
        let span = debug_span!("conversation", job_id = %request.job_id);
        async {
            match self.drive(&request, &events).await {
                Ok(()) => debug!("conversation finished"),
                Err(Halt::Disconnected) => {
                    debug!("event receiver dropped, conversation stopped");
                }
                Err(Halt::Failed(err)) => {
                    error!("conversation failed: {err}");
                    events.emit(Event::error(err.to_string())).await.ok();
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        events: &EventSender,
    ) -> Result<(), Halt> {
        let inner = &*self.inner;
        let mut state = ConversationState::seed(
            &inner.system_prompt,
            &request.job_id,
            &request.message,
            inner.turn_budget,
        );

        let mut stage = Stage::Seeded;
        loop {
            if stage != Stage::Done && events.is_closed() {
                return Err(Halt::Disconnected);
            }
            trace!(
                "entering stage: {stage} (remaining turns: {})",
                state.remaining_turns()
            );
            stage = match stage {
                Stage::Seeded if state.remaining_turns() == 0 => {
                    Stage::FinalStream
                }
                Stage::Seeded => Stage::AwaitingModel,
                Stage::AwaitingModel => {
                    let msg = inner
                        .model_client
                        .complete(
                            state.history().to_vec(),
                            inner.dispatcher.definitions(),
                        )
                        .await?;
                    let has_tool_calls = !msg.tool_calls().is_empty();
                    state.push_assistant(msg);
                    if has_tool_calls {
                        Stage::DispatchingTools
                    } else {
                        Stage::FinalStream
                    }
                }
                Stage::DispatchingTools => {
                    let calls = state.pending_tool_calls().to_vec();
                    let results = inner
                        .dispatcher
                        .dispatch(&calls, state.job_id(), events)
                        .instrument(debug_span!("tool dispatch"))
                        .await?;
                    for result in results {
                        state.push_tool_result(result)?;
                    }
                    if state.consume_turn() {
                        Stage::AwaitingModel
                    } else {
                        debug!("turn budget spent, answering now");
                        Stage::FinalStream
                    }
                }
                Stage::FinalStream => {
                    let mut stream =
                        inner.model_client.stream(state.history().to_vec()).await?;
                    while let Some(delta) = stream.next_delta().await? {
                        if !delta.is_empty() {
                            events.emit(Event::token(delta)).await?;
                        }
                    }
                    Stage::Done
                }
                Stage::Done => return Ok(()),
            };
        }
    }
}
