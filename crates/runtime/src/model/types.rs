//! Core model types shared across providers.
//!
//! These represent the universal concepts of a chat exchange. Anything
//! provider-specific (wire formats, auth, endpoints) belongs in the adapter
//! modules under `providers`.

use super::errors::ModelError;
use crate::tools::ToolError;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier correlating this call with its result.
    pub id: String,
    pub name: String,
    /// Raw arguments as produced by the model, unvalidated.
    pub arguments: Value,
}

/// Outcome of a dispatched tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        tool_call_id: String,
        output: Value,
    },
    Failure {
        tool_call_id: String,
        error: ToolError,
    },
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, output: Value) -> Self {
        Self::Success {
            tool_call_id: tool_call_id.into(),
            output,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: ToolError) -> Self {
        Self::Failure {
            tool_call_id: tool_call_id.into(),
            error,
        }
    }

    pub fn tool_call_id(&self) -> &str {
        match self {
            Self::Success { tool_call_id, .. } | Self::Failure { tool_call_id, .. } => tool_call_id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// A part of a message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A message in the conversation, one role and one or more parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// A tool-role message carrying dispatch results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    pub fn from_parts(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Combined text content of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool calls in this message.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A tool definition as exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Accumulate another call's usage into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Everything a provider needs for one request.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// A provider's complete response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: Message,
    pub usage: Usage,
}

/// One increment of a streamed response, in generation order.
///
/// Concatenating every `TextDelta` of a stream yields the same text a
/// [`Backend::complete`] call would have returned for that response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    TextDelta(String),
    /// The model started emitting a tool call.
    ToolCallStart { id: String, name: String },
    /// A fragment of the pending tool call's JSON arguments.
    ToolCallDelta(String),
    /// Terminal chunk carrying final usage.
    Done(Usage),
}

/// A finite stream of response chunks. Restart by issuing a fresh call.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ModelError>> + Send>>;

/// Interface over LLM provider backends.
///
/// A variant is selected at setup time and used for the lifetime of the
/// exchanges it serves. Transient transport failures (timeouts, rate limits)
/// are retried inside the implementation; what surfaces from these methods is
/// final.
pub trait Backend: Send + Sync {
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;

    /// Stream a response chunk by chunk. Optional capability; backends
    /// without native streaming keep the default.
    fn stream(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ResponseStream, ModelError>> + Send {
        let _ = request;
        std::future::ready(Err(ModelError::StreamUnsupported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_skips_non_text_parts() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                Part::text("Hello "),
                Part::ToolCall(ToolCall {
                    id: "1".into(),
                    name: "lookup".into(),
                    arguments: Value::Null,
                }),
                Part::text("world"),
            ],
        );
        assert_eq!(msg.text(), "Hello world");
    }

    #[test]
    fn message_tool_calls_extraction() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                Part::text("Let me check"),
                Part::ToolCall(ToolCall {
                    id: "1".into(),
                    name: "search".into(),
                    arguments: Value::Null,
                }),
                Part::ToolCall(ToolCall {
                    id: "2".into(),
                    name: "read".into(),
                    arguments: Value::Null,
                }),
            ],
        );
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[1].name, "read");
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
        };
        usage.add(Usage {
            input_tokens: 3,
            output_tokens: 7,
        });
        assert_eq!(usage.input_tokens, 13);
        assert_eq!(usage.output_tokens, 12);
    }

    #[test]
    fn tool_result_correlates_by_call_id() {
        let ok = ToolResult::success("call_1", Value::String("out".into()));
        assert_eq!(ok.tool_call_id(), "call_1");
        assert!(!ok.is_failure());
    }
}
