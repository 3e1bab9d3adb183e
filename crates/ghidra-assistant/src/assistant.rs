use ghidra_assistant_core::event::EventSender;
use ghidra_assistant_core::tool::UnknownToolPolicy;
use ghidra_assistant_core::{
    ChatRequest, Orchestrator, OrchestratorBuilder, RetryPolicy,
};
use ghidra_assistant_model::ModelProvider;
use serde_json::Value;

use crate::backend::{BackendError, HttpToolBackend};
use crate::tools::register_tools;

/// The instructions every conversation starts with.
pub const SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// An assistant builder.
///
/// See [`Assistant`].
pub struct AssistantBuilder {
    orchestrator_builder: OrchestratorBuilder,
    backend: HttpToolBackend,
}

impl AssistantBuilder {
    /// Creates an assistant builder with a specified model provider and
    /// analysis backend.
    pub fn new<M: ModelProvider + 'static>(
        provider: M,
        backend: HttpToolBackend,
    ) -> Self {
        let orchestrator_builder = OrchestratorBuilder::with_model_provider(
            provider,
        )
        .with_system_prompt(SYSTEM_PROMPT.trim_end());
        Self {
            orchestrator_builder,
            backend,
        }
    }

    /// Overrides the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the maximum number of tool turns per conversation.
    #[inline]
    pub fn with_turn_budget(mut self, turn_budget: usize) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_turn_budget(turn_budget);
        self
    }

    /// Sets how requests to the model are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_retry_policy(retry_policy);
        self
    }

    /// Sets how calls to unregistered tools are handled.
    #[inline]
    pub fn with_unknown_tool_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_unknown_tool_policy(policy);
        self
    }

    /// Runs the tool calls of one model response concurrently.
    #[inline]
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.orchestrator_builder =
            self.orchestrator_builder.with_parallel_tool_calls(parallel);
        self
    }

    /// Builds a new assistant with the analysis tool set registered.
    pub fn build(self) -> Assistant {
        let orchestrator =
            register_tools(self.orchestrator_builder, &self.backend).build();
        Assistant {
            orchestrator,
            backend: self.backend,
        }
    }
}

/// A reverse engineering assistant answering questions about analysis jobs.
///
/// Cloning is cheap, every clone serves conversations independently.
#[derive(Clone)]
pub struct Assistant {
    orchestrator: Orchestrator,
    backend: HttpToolBackend,
}

impl Assistant {
    /// Answers a question, reporting progress and the answer to `events`.
    #[inline]
    pub async fn chat(&self, request: ChatRequest, events: EventSender) {
        self.orchestrator.run(request, events).await
    }

    /// Fetches the analysis status of a job from the backend.
    #[inline]
    pub async fn status(&self, job_id: &str) -> Result<Value, BackendError> {
        self.backend.status(job_id).await
    }

    /// Returns the underlying orchestrator.
    #[inline]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
