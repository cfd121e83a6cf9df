//! Built-in tools: shell commands and file operations.
//!
//! These cover the common ground most deployments want without writing a
//! handler: running a shell command with a timeout, and reading, writing, or
//! appending files. Each function returns a ready-to-register
//! [`ToolDefinition`].

use crate::tools::{ToolDefinition, ToolError, ToolHandler};
use async_trait::async_trait;
use schema::{Field, FieldType, Schema};
use serde_json::{Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_SHELL: &str = "/bin/sh";
const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs one-line shell commands in a subprocess.
pub struct ShellTool {
    shell: String,
    timeout: Duration,
}

impl ShellTool {
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Use a different shell executable.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Kill the subprocess after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition::new(
            "run_shell",
            "Run a one-line shell command and return its output",
            Schema::new("run_shell").field(
                Field::new("command", FieldType::String).description("The command to execute"),
            ),
            self,
        )
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ShellTool {
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let command = required_str(&arguments, "command")?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| ToolError::Execution(format!("failed to spawn {}: {e}", self.shell)))?;

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code(),
        }))
    }
}

/// Read a file and return its contents.
pub fn file_read() -> ToolDefinition {
    ToolDefinition::from_fn(
        "file_read",
        "Read a file",
        Schema::new("file_read")
            .field(Field::new("path", FieldType::String).description("Path of the file to read")),
        |args| async move {
            let path = required_str(&args, "path")?;
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ToolError::Execution(format!("read {path}: {e}")))?;
            Ok(Value::String(contents))
        },
    )
}

/// Write to a file, overwriting any existing contents.
pub fn file_write() -> ToolDefinition {
    ToolDefinition::from_fn(
        "file_write",
        "Write to a file, overwriting it if it exists",
        Schema::new("file_write")
            .field(Field::new("path", FieldType::String).description("Path of the file to write"))
            .field(Field::new("content", FieldType::String).description("Content to write")),
        |args| async move {
            let path = required_str(&args, "path")?;
            let content = required_str(&args, "content")?;
            tokio::fs::write(path, content)
                .await
                .map_err(|e| ToolError::Execution(format!("write {path}: {e}")))?;
            Ok(json!({"bytes_written": content.len()}))
        },
    )
}

/// Append to a file, creating it if absent.
pub fn file_append() -> ToolDefinition {
    ToolDefinition::from_fn(
        "file_append",
        "Append to a file, creating it if it does not exist",
        Schema::new("file_append")
            .field(Field::new("path", FieldType::String).description("Path of the file to append to"))
            .field(Field::new("content", FieldType::String).description("Content to append")),
        |args| async move {
            use tokio::io::AsyncWriteExt as _;

            let path = required_str(&args, "path")?;
            let content = required_str(&args, "content")?;
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await
                .map_err(|e| ToolError::Execution(format!("append {path}: {e}")))?;
            file.write_all(content.as_bytes())
                .await
                .map_err(|e| ToolError::Execution(format!("append {path}: {e}")))?;
            Ok(json!({"bytes_written": content.len()}))
        },
    )
}

// Arguments arrive schema-validated, so a missing key here is a wiring bug,
// reported as an execution failure rather than unwrapped.
fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .ok_or_else(|| ToolError::Execution(format!("missing argument: {key}")))
}
