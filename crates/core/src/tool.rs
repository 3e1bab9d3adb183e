//! Tool call supports.

mod catalog;
mod dispatcher;
mod error;
mod object;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use catalog::ToolCatalog;
pub use dispatcher::{ToolDispatcher, UnknownToolPolicy, prepare_arguments};
pub use error::{Error, ErrorKind};
pub(crate) use object::{AnyTool, ToolObject};

/// The argument every tool call is scoped to.
pub const JOB_ID_KEY: &str = "job_id";

/// The result of a tool call.
///
/// A successful result carries the structured payload the backend returned,
/// it is serialized as text before being handed to the model.
pub type ToolResult = Result<Value, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless. Configuration such as
/// the backend address can be made an immutable state of the tool, set during
/// initialization and cloned into the future when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    ///
    /// Arguments produced by the model are validated against this type
    /// before the tool runs. The `job_id` argument has already been injected
    /// at that point.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Returns a short human-readable label shown while the tool runs.
    ///
    /// Tools without a label are announced with a generic one.
    fn progress_label(&self) -> Option<&str> {
        None
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
