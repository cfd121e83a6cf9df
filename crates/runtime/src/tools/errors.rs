use schema::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool registration or execution.
///
/// `Unknown`, `InvalidArguments`, and `Execution` are recoverable inside a
/// conversation: the dispatcher folds them into tool-role messages so the
/// model can correct itself on the next turn. `Duplicate` is a setup-time
/// error and never reaches a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(ValidationError),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("tool already registered: {0}")]
    Duplicate(String),
}

impl From<ValidationError> for ToolError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidArguments(err)
    }
}
