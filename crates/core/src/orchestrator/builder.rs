use ghidra_assistant_model::ModelProvider;

use super::{Inner, Orchestrator};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{Tool, ToolCatalog, ToolDispatcher, UnknownToolPolicy};

/// The number of tool turns a conversation may take by default.
pub const DEFAULT_TURN_BUDGET: usize = 5;

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder {
    model_client: ModelClient,
    catalog: ToolCatalog,
    system_prompt: String,
    turn_budget: usize,
    retry_policy: RetryPolicy,
    unknown_tool_policy: UnknownToolPolicy,
    parallel_tool_calls: bool,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            catalog: ToolCatalog::default(),
            system_prompt: String::new(),
            turn_budget: DEFAULT_TURN_BUDGET,
            retry_policy: RetryPolicy::default(),
            unknown_tool_policy: UnknownToolPolicy::default(),
            parallel_tool_calls: false,
        }
    }

    /// Sets the system instructions every conversation starts with.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets the maximum number of tool turns per conversation.
    ///
    /// A budget of zero sends the user straight to the final answer.
    #[inline]
    pub fn with_turn_budget(mut self, turn_budget: usize) -> Self {
        self.turn_budget = turn_budget;
        self
    }

    /// Sets how tool-enabled completions are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets how calls to unregistered tools are handled.
    #[inline]
    pub fn with_unknown_tool_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.unknown_tool_policy = policy;
        self
    }

    /// Runs the tool calls of one assistant message concurrently.
    ///
    /// Results are still recorded in call order.
    #[inline]
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.catalog.add_tool(tool);
        self
    }

    /// Builds the orchestrator.
    pub fn build(self) -> Orchestrator {
        let Self {
            model_client,
            catalog,
            system_prompt,
            turn_budget,
            retry_policy,
            unknown_tool_policy,
            parallel_tool_calls,
        } = self;
        debug!(
            tools = catalog.len(),
            turn_budget, parallel_tool_calls, "building orchestrator"
        );
        Orchestrator::from_inner(Inner {
            model_client: model_client.with_retry_policy(retry_policy),
            dispatcher: ToolDispatcher::new(
                catalog,
                unknown_tool_policy,
                parallel_tool_calls,
            ),
            system_prompt,
            turn_budget,
        })
    }
}
