//! Provider-agnostic conversation protocol and backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, Message, ModelRequest, ModelResponse, Part, ResponseStream, Role, StreamChunk,
    ToolCall, ToolResult, ToolSpec, Usage,
};
