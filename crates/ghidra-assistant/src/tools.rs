//! The analysis tools offered to the model.
//!
//! Every tool is a thin proxy for one endpoint of the analysis backend. The
//! typed parameter structs below double as the JSON schema advertised to
//! the model and as the validation applied to its arguments.

use std::marker::PhantomData;

use ghidra_assistant_core::OrchestratorBuilder;
use ghidra_assistant_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::HttpToolBackend;

/// Parameters of tools that only need the job.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct JobParameters {
    #[schemars(description = "Identifier of the analysis job.")]
    job_id: String,
}

/// Parameters of tools that operate on one function.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FunctionParameters {
    #[schemars(description = "Identifier of the analysis job.")]
    job_id: String,
    #[schemars(description = "Address of the function, e.g. `0x401000`.")]
    addr: String,
}

/// Parameters of `list_strings`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StringsParameters {
    #[schemars(description = "Identifier of the analysis job.")]
    job_id: String,
    #[schemars(description = "Minimum length of the returned strings.")]
    #[serde(skip_serializing_if = "Option::is_none")]
    min_length: Option<u32>,
}

/// Parameters of `query_artifacts`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryParameters {
    #[schemars(description = "Identifier of the analysis job.")]
    job_id: String,
    #[schemars(
        description = "What to look for in function names and decompiled snippets."
    )]
    query: String,
}

/// A tool that forwards validated parameters to the analysis backend.
pub struct BackendTool<P> {
    name: &'static str,
    description: &'static str,
    label: &'static str,
    parameter_schema: Value,
    backend: HttpToolBackend,
    _parameters: PhantomData<fn() -> P>,
}

impl<P: JsonSchema> BackendTool<P> {
    /// Creates a tool calling `POST /tools/{name}` on `backend`.
    pub fn new(
        name: &'static str,
        description: &'static str,
        label: &'static str,
        backend: HttpToolBackend,
    ) -> Self {
        Self {
            name,
            description,
            label,
            parameter_schema: schema_for!(P).to_value(),
            backend,
            _parameters: PhantomData,
        }
    }
}

impl<P> Tool for BackendTool<P>
where
    P: Serialize + DeserializeOwned + Send + 'static,
{
    type Input = P;

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn progress_label(&self) -> Option<&str> {
        Some(self.label)
    }

    fn execute(
        &self,
        input: P,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let backend = self.backend.clone();
        let name = self.name;
        async move {
            let arguments = serde_json::to_value(&input).map_err(|err| {
                ToolError::execution_error().with_reason(err.to_string())
            })?;
            Ok(backend.call(name, &arguments).await)
        }
    }
}

/// Registers the whole analysis tool set on `builder`.
pub fn register_tools(
    builder: OrchestratorBuilder,
    backend: &HttpToolBackend,
) -> OrchestratorBuilder {
    builder
        .with_tool(BackendTool::<JobParameters>::new(
            "status",
            "Get status for an existing analysis job.",
            "Checking analysis status...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<JobParameters>::new(
            "list_functions",
            "Retrieve the list of discovered functions for a job.",
            "Listing functions...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<FunctionParameters>::new(
            "decompile_function",
            "Get decompiled pseudocode for a function at a given address.",
            "Decompiling function...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<FunctionParameters>::new(
            "get_xrefs",
            "Get callers and callees for a function (cross-references).",
            "Looking up cross-references...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<JobParameters>::new(
            "list_imports",
            "List imported libraries and symbols for the binary.",
            "Listing imports...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<StringsParameters>::new(
            "list_strings",
            "Return printable strings extracted from the binary.",
            "Extracting strings...",
            backend.clone(),
        ))
        .with_tool(BackendTool::<QueryParameters>::new(
            "query_artifacts",
            "Simple natural-language-like query over artifacts \
             (function names, decompiled snippets).",
            "Searching analysis artifacts...",
            backend.clone(),
        ))
}
