//! OpenAI-compatible chat completions backend.
//!
//! Works against api.openai.com and any service exposing the same chat
//! completions surface; point `base_url` at the compatible endpoint.

use super::{DEFAULT_TIMEOUT, DEFAULT_TRANSPORT_ATTEMPTS, send_with_retries};
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, ResponseStream, Role,
    StreamChunk, ToolCall, ToolResult, ToolSpec, Usage,
};
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    /// Arguments travel as a JSON-encoded string on this wire.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseToolCall {
    id: String,
    function: ApiResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ApiResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    timeout: Duration,
    transport_attempts: u32,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            max_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            transport_attempts: DEFAULT_TRANSPORT_ATTEMPTS,
        }
    }

    /// Target a compatible service at a different base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts for transient transport failures, including the first.
    pub fn transport_attempts(mut self, attempts: u32) -> Self {
        self.transport_attempts = attempts.max(1);
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            transport_attempts: self.transport_attempts,
        }
    }
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    max_tokens: Option<u32>,
    timeout: Duration,
    transport_attempts: u32,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key, model)
    }

    fn message_to_api(msg: &Message, out: &mut Vec<ApiMessage>) {
        match msg.role {
            Role::System | Role::User => out.push(ApiMessage {
                role: if msg.role == Role::System {
                    "system"
                } else {
                    "user"
                },
                content: Some(msg.text()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }),
            Role::Assistant => {
                let text = msg.text();
                let tool_calls: Vec<ApiToolCall> = msg
                    .tool_calls()
                    .into_iter()
                    .map(|call| ApiToolCall {
                        id: call.id,
                        kind: "function",
                        function: ApiFunctionCall {
                            name: call.name,
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect();
                out.push(ApiMessage {
                    role: "assistant",
                    content: (!text.is_empty()).then_some(text),
                    tool_calls,
                    tool_call_id: None,
                });
            }
            // One wire message per tool result.
            Role::Tool => {
                for part in &msg.parts {
                    if let Part::ToolResult(result) = part {
                        let content = match result {
                            ToolResult::Success { output, .. } => output.to_string(),
                            ToolResult::Failure { error, .. } => error.to_string(),
                        };
                        out.push(ApiMessage {
                            role: "tool",
                            content: Some(content),
                            tool_calls: Vec::new(),
                            tool_call_id: Some(result.tool_call_id().to_string()),
                        });
                    }
                }
            }
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            kind: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }

    fn to_api_request(&self, request: &ModelRequest<'_>, stream: bool) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(ApiMessage {
                role: "system",
                content: Some(system.to_string()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            });
        }
        for msg in request.messages {
            Self::message_to_api(msg, &mut messages);
        }

        ApiRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: stream.then_some(true),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = Vec::new();
        if let Some(text) = message.content
            && !text.is_empty()
        {
            parts.push(Part::Text { text });
        }
        for call in message.tool_calls {
            // Malformed argument JSON is kept verbatim; argument validation
            // downstream turns it into a correctable failure.
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments));
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }));
        }
        Message {
            role: Role::Assistant,
            parts,
        }
    }

    fn post(&self, body: &ApiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(body)
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.model)
    }
}

impl Backend for OpenAiBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = self.to_api_request(&request, false);
        debug!(model = %self.model, messages = api_request.messages.len(), "openai request");

        let response = send_with_retries(|| self.post(&api_request), self.transport_attempts).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Self::response_to_message(choice.message),
            usage,
        })
    }

    async fn stream(&self, request: ModelRequest<'_>) -> Result<ResponseStream, ModelError> {
        let api_request = self.to_api_request(&request, true);
        debug!(model = %self.model, "openai stream request");

        let response = send_with_retries(|| self.post(&api_request), self.transport_attempts).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut usage = Usage::default();
            let mut buf = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| ModelError::Network(e.to_string()))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    let Some(data) = line.trim().strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        yield StreamChunk::Done(usage);
                        break 'outer;
                    }
                    for event in parse_chunk_data(data) {
                        match event {
                            ChunkEvent::Text(text) => yield StreamChunk::TextDelta(text),
                            ChunkEvent::ToolCallStart { id, name } => {
                                yield StreamChunk::ToolCallStart { id, name };
                            }
                            ChunkEvent::ToolCallArguments(fragment) => {
                                yield StreamChunk::ToolCallDelta(fragment);
                            }
                            ChunkEvent::Usage {
                                input_tokens,
                                output_tokens,
                            } => {
                                usage.input_tokens = input_tokens;
                                usage.output_tokens = output_tokens;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum ChunkEvent {
    Text(String),
    ToolCallStart { id: String, name: String },
    ToolCallArguments(String),
    Usage { input_tokens: u32, output_tokens: u32 },
}

/// Parse one streamed chunk payload. A single chunk can carry several
/// deltas; malformed payloads yield nothing.
fn parse_chunk_data(data: &str) -> Vec<ChunkEvent> {
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(usage) = json.get("usage").filter(|u| !u.is_null()) {
        events.push(ChunkEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });
    }

    let Some(delta) = json["choices"][0].get("delta") else {
        return events;
    };

    if let Some(text) = delta.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        events.push(ChunkEvent::Text(text.to_string()));
    }

    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            if let (Some(id), Some(name)) = (
                call.get("id").and_then(Value::as_str),
                call["function"].get("name").and_then(Value::as_str),
            ) {
                events.push(ChunkEvent::ToolCallStart {
                    id: id.to_string(),
                    name: name.to_string(),
                });
            }
            if let Some(arguments) = call["function"].get("arguments").and_then(Value::as_str)
                && !arguments.is_empty()
            {
                events.push(ChunkEvent::ToolCallArguments(arguments.to_string()));
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_content_deltas() {
        let events =
            parse_chunk_data(r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#);
        assert_eq!(events, vec![ChunkEvent::Text("Hi".into())]);
    }

    #[test]
    fn parses_tool_call_start_and_arguments() {
        let events = parse_chunk_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_weather","arguments":"{\"ci"}}]}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                ChunkEvent::ToolCallStart {
                    id: "call_1".into(),
                    name: "get_weather".into()
                },
                ChunkEvent::ToolCallArguments("{\"ci".into()),
            ]
        );
    }

    #[test]
    fn parses_final_usage_chunk() {
        let events = parse_chunk_data(
            r#"{"choices":[],"usage":{"prompt_tokens":20,"completion_tokens":9}}"#,
        );
        assert_eq!(
            events,
            vec![ChunkEvent::Usage {
                input_tokens: 20,
                output_tokens: 9
            }]
        );
    }

    #[test]
    fn malformed_chunks_yield_nothing() {
        assert!(parse_chunk_data("not json").is_empty());
        assert!(parse_chunk_data(r#"{"unrelated": 1}"#).is_empty());
    }

    #[test]
    fn delta_concatenation_reconstructs_full_text() {
        let lines = [
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
            r#"{"choices":[{"delta":{"content":", world"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ];
        let mut text = String::new();
        for line in lines {
            for event in parse_chunk_data(line) {
                if let ChunkEvent::Text(delta) = event {
                    text.push_str(&delta);
                }
            }
        }
        assert_eq!(text, "Hello, world");
    }

    #[test]
    fn tool_results_become_tool_messages() {
        use crate::tools::ToolError;

        let msg = Message::tool_results(vec![
            ToolResult::success("call_1", json!({"ok": true})),
            ToolResult::failure("call_2", ToolError::Execution("boom".into())),
        ]);
        let mut out = Vec::new();
        OpenAiBackend::message_to_api(&msg, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, "tool");
        assert_eq!(out[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(out[1].tool_call_id.as_deref(), Some("call_2"));
    }

    #[test]
    fn malformed_tool_arguments_kept_verbatim() {
        let message = OpenAiBackend::response_to_message(ApiResponseMessage {
            content: None,
            tool_calls: vec![ApiResponseToolCall {
                id: "call_1".into(),
                function: ApiResponseFunction {
                    name: "get_weather".into(),
                    arguments: "{not json".into(),
                },
            }],
        });
        let calls = message.tool_calls();
        assert_eq!(calls[0].arguments, Value::String("{not json".into()));
    }
}
