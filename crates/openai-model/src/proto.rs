use ghidra_assistant_model::{
    ModelMessage, ModelRequest, ModelTool, ToolCallRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionToolCall>,
}

impl ToolCall {
    /// Converts a fully received tool call into the provider-neutral
    /// request. Missing fields become empty strings, the arguments are left
    /// untouched for the dispatcher to repair.
    pub fn to_request(&self) -> ToolCallRequest {
        let function = self.function.as_ref();
        ToolCallRequest {
            id: self.id.clone().unwrap_or_default(),
            name: function
                .and_then(|f| f.name.clone())
                .unwrap_or_default(),
            arguments: function
                .and_then(|f| f.arguments.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChunkChoice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    let tools: Vec<_> = req.tools.iter().map(create_tool).collect();
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tool_choice: (!tools.is_empty()).then_some("auto"),
        tools,
        stream_options: req.stream.then_some(StreamOptions {
            include_usage: true,
        }),
        stream: req.stream,
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant {
            content,
            tool_calls,
        } => Message::Assistant {
            content: content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls.iter().map(create_tool_call).collect())
            },
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            name: result.name.clone(),
            content: result.content.clone(),
        },
    }
}

#[inline]
fn create_tool_call(req: &ToolCallRequest) -> ToolCall {
    ToolCall {
        index: None,
        id: Some(req.id.clone()),
        r#type: Some("function".to_owned()),
        function: Some(FunctionToolCall {
            name: Some(req.name.clone()),
            arguments: Some(req.arguments.clone()),
        }),
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use ghidra_assistant_model::ToolCallResult;
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    fn config() -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build()
    }

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::User("Hello".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "list_functions".to_owned(),
                description: "Lists functions.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": { "job_id": { "type": "string" } }
                }),
            }],
            stream: false,
        };
        let expected = ChatCompletionRequest {
            model: "custom".to_owned(),
            messages: vec![
                Message::System {
                    content: "You are a helpful assistant.".to_owned(),
                },
                Message::User {
                    content: "Hello".to_owned(),
                },
            ],
            tools: vec![Tool {
                r#type: "function",
                function: FunctionTool {
                    name: "list_functions".to_owned(),
                    description: "Lists functions.".to_owned(),
                    parameters: json!({
                        "type": "object",
                        "properties": { "job_id": { "type": "string" } }
                    }),
                },
            }],
            tool_choice: Some("auto"),
            stream_options: None,
            stream: false,
        };
        assert_eq!(create_request(&request, &config()), expected);
    }

    #[test]
    fn test_streaming_request_without_tools() {
        let request = ModelRequest {
            messages: vec![ModelMessage::User("Hello".to_owned())],
            tools: vec![],
            stream: true,
        };
        let value =
            serde_json::to_value(create_request(&request, &config())).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "custom",
                "messages": [{ "role": "user", "content": "Hello" }],
                "stream_options": { "include_usage": true },
                "stream": true
            })
        );
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::Assistant {
                    content: None,
                    tool_calls: vec![ToolCallRequest {
                        id: "call_1".to_owned(),
                        name: "list_functions".to_owned(),
                        arguments: "{}".to_owned(),
                    }],
                },
                ModelMessage::Tool(ToolCallResult {
                    id: "call_1".to_owned(),
                    name: "list_functions".to_owned(),
                    content: r#"{"functions":["main"]}"#.to_owned(),
                }),
            ],
            tools: vec![],
            stream: false,
        };
        let value =
            serde_json::to_value(create_request(&request, &config())).unwrap();
        assert_eq!(
            value["messages"],
            json!([
                {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "list_functions",
                            "arguments": "{}"
                        }
                    }]
                },
                {
                    "role": "tool",
                    "tool_call_id": "call_1",
                    "name": "list_functions",
                    "content": "{\"functions\":[\"main\"]}"
                }
            ])
        );
    }
}
