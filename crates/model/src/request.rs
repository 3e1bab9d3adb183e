use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model. An empty list disables tool
    /// calling for this request.
    pub tools: Vec<ModelTool>,
    /// Whether the response should be delivered incrementally.
    pub stream: bool,
}

/// A complete message in the conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A message produced by the model.
    Assistant {
        /// Text of the message, absent when the model only requested tools.
        content: Option<String>,
        /// Tool calls requested by the model, in the order they were
        /// emitted.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn assistant_text<S: Into<String>>(content: S) -> Self {
        ModelMessage::Assistant {
            content: Some(content.into()),
            tool_calls: vec![],
        }
    }

    /// Returns the tool calls carried by this message, which is always
    /// empty for non-assistant messages.
    #[inline]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            ModelMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool that was called.
    pub name: String,
    /// The result of the tool call, serialized as text.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
