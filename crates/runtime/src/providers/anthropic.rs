//! Anthropic Messages API backend.

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

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    transport_attempts: u32,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
            timeout: DEFAULT_TIMEOUT,
            transport_attempts: DEFAULT_TRANSPORT_ATTEMPTS,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
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

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            transport_attempts: self.transport_attempts,
        }
    }
}

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    transport_attempts: u32,
}

impl AnthropicBackend {
    pub fn builder(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key, model)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User | Role::System | Role::Tool => "user",
            Role::Assistant => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        // Simple case: single text part
        if let [Part::Text { text }] = &msg.parts[..] {
            return ApiMessage {
                role,
                content: ApiContent::Text(text.clone()),
            };
        }

        let blocks: Vec<ApiContentBlock> = msg
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => ApiContentBlock::Text { text: text.clone() },
                Part::ToolCall(call) => ApiContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                },
                Part::ToolResult(result) => {
                    let (tool_use_id, content, is_error) = match result {
                        ToolResult::Success {
                            tool_call_id,
                            output,
                        } => (tool_call_id.clone(), output.to_string(), false),
                        ToolResult::Failure {
                            tool_call_id,
                            error,
                        } => (tool_call_id.clone(), error.to_string(), true),
                    };
                    ApiContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    }
                }
            })
            .collect();

        ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema.clone(),
        }
    }

    fn response_to_message(blocks: Vec<ApiResponseBlock>) -> Message {
        let parts: Vec<Part> = blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(Part::Text { text }),
                ApiResponseBlock::ToolUse { id, name, input } => Some(Part::ToolCall(ToolCall {
                    id,
                    name,
                    arguments: input,
                })),
                ApiResponseBlock::Unknown => None,
            })
            .collect();

        Message {
            role: Role::Assistant,
            parts,
        }
    }

    fn to_api_request(&self, request: &ModelRequest<'_>, stream: bool) -> ApiRequest {
        let messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Self::message_to_api)
            .collect();

        ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            system: request.system.map(str::to_string),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: stream.then_some(true),
        }
    }

    fn post(&self, body: &ApiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .timeout(self.timeout)
            .json(body)
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl Backend for AnthropicBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = self.to_api_request(&request, false);
        debug!(model = %self.model, messages = api_request.messages.len(), "anthropic request");

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

        let message = Self::response_to_message(api_response.content);
        let usage = Usage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        };

        Ok(ModelResponse { message, usage })
    }

    async fn stream(&self, request: ModelRequest<'_>) -> Result<ResponseStream, ModelError> {
        let api_request = self.to_api_request(&request, true);
        debug!(model = %self.model, "anthropic stream request");

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
                    match parse_data_line(data.trim()) {
                        Some(SseEvent::MessageStart { input_tokens }) => {
                            usage.input_tokens = input_tokens;
                        }
                        Some(SseEvent::ToolUseStart { id, name }) => {
                            yield StreamChunk::ToolCallStart { id, name };
                        }
                        Some(SseEvent::TextDelta(text)) => {
                            yield StreamChunk::TextDelta(text);
                        }
                        Some(SseEvent::InputJsonDelta(json)) => {
                            yield StreamChunk::ToolCallDelta(json);
                        }
                        Some(SseEvent::MessageDelta { output_tokens }) => {
                            usage.output_tokens = output_tokens;
                        }
                        Some(SseEvent::MessageStop) => {
                            yield StreamChunk::Done(usage);
                            break 'outer;
                        }
                        None => {}
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
enum SseEvent {
    MessageStart { input_tokens: u32 },
    ToolUseStart { id: String, name: String },
    TextDelta(String),
    InputJsonDelta(String),
    MessageDelta { output_tokens: u32 },
    MessageStop,
}

/// Parse the payload of one `data:` line. Unknown or malformed events are
/// skipped, matching the protocol's forward-compatibility rules.
fn parse_data_line(data: &str) -> Option<SseEvent> {
    let json: Value = serde_json::from_str(data).ok()?;
    match json.get("type")?.as_str()? {
        "message_start" => {
            let input_tokens = json["message"]["usage"]["input_tokens"].as_u64()? as u32;
            Some(SseEvent::MessageStart { input_tokens })
        }
        "content_block_start" => {
            let block = json.get("content_block")?;
            if block.get("type")?.as_str()? != "tool_use" {
                return None;
            }
            Some(SseEvent::ToolUseStart {
                id: block.get("id")?.as_str()?.to_string(),
                name: block.get("name")?.as_str()?.to_string(),
            })
        }
        "content_block_delta" => {
            let delta = json.get("delta")?;
            match delta.get("type")?.as_str()? {
                "text_delta" => Some(SseEvent::TextDelta(
                    delta.get("text")?.as_str()?.to_string(),
                )),
                "input_json_delta" => Some(SseEvent::InputJsonDelta(
                    delta.get("partial_json")?.as_str()?.to_string(),
                )),
                _ => None,
            }
        }
        "message_delta" => {
            let output_tokens = json["usage"]["output_tokens"].as_u64()? as u32;
            Some(SseEvent::MessageDelta { output_tokens })
        }
        "message_stop" => Some(SseEvent::MessageStop),
        _ => None,
    }
}
