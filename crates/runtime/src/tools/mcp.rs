//! MCP-backed tool registration.
//!
//! Spawns an MCP (Model Context Protocol) server as a child process using the
//! official rmcp SDK and registers each tool it advertises as a dispatchable
//! [`ToolDefinition`]. Argument validation for these tools is delegated to
//! the server, which owns their schemas.

use crate::model::ToolSpec;
use crate::tools::{ToolDefinition, ToolError, ToolHandler, ToolRegistry};
use async_trait::async_trait;
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParams, CallToolResult, Tool},
    service::RunningService,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Error type for MCP operations.
pub type McpError = Box<dyn std::error::Error + Send + Sync>;

/// An MCP client connected to a server process.
#[derive(Clone)]
pub struct McpClient {
    service: Arc<RunningService<rmcp::service::RoleClient, ()>>,
}

impl McpClient {
    /// Spawn an MCP server and connect to it.
    pub async fn spawn(
        command: impl AsRef<str>,
        args: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, McpError> {
        let command_str = command.as_ref().to_string();
        let args_vec: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();

        let transport = TokioChildProcess::new(Command::new(&command_str).configure(|cmd| {
            for arg in &args_vec {
                cmd.arg(arg);
            }
        }))?;

        let service = ().serve(transport).await?;

        Ok(Self {
            service: Arc::new(service),
        })
    }

    /// List available tools from the server.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let response = self.service.list_tools(Default::default()).await?;
        Ok(response.tools)
    }

    /// Call a tool with the given name and arguments.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let params = CallToolRequestParams {
            name: name.into().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = self.service.call_tool(params).await?;
        Ok(result)
    }
}

struct McpHandler {
    client: McpClient,
    name: String,
}

#[async_trait]
impl ToolHandler for McpHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(ToolError::Execution(format!(
                    "arguments must be an object, got {other}"
                )));
            }
        };

        let result = self
            .client
            .call_tool(&self.name, arguments)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        serde_json::to_value(&result.content)
            .map_err(|e| ToolError::Execution(format!("serialize result: {e}")))
    }
}

/// Register every tool the server advertises. Returns how many were added.
pub async fn register_mcp_tools(
    registry: &mut ToolRegistry,
    client: &McpClient,
) -> Result<usize, McpError> {
    let tools = client.list_tools().await?;
    let count = tools.len();
    for tool in tools {
        let spec = ToolSpec {
            name: tool.name.to_string(),
            description: tool
                .description
                .as_deref()
                .unwrap_or_default()
                .to_string(),
            input_schema: Value::Object((*tool.input_schema).clone()),
        };
        debug!(tool = %spec.name, "registering MCP tool");
        let handler = McpHandler {
            client: client.clone(),
            name: spec.name.clone(),
        };
        registry.register(ToolDefinition::raw(spec, handler))?;
    }
    Ok(count)
}
