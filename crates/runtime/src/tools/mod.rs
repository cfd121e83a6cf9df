//! Tool registration and dispatch.
//!
//! A [`ToolRegistry`] is populated once at setup time and is read-only
//! afterwards, so it can be shared across concurrent exchanges behind an
//! `Arc` without locking. Dispatch outcomes, including lookup and argument
//! failures, are rendered into tool-role messages rather than raised: the
//! conversation must always be able to continue or end gracefully no matter
//! what a tool does.

pub mod builtin;
pub mod errors;
pub mod mcp;
mod registry;

pub use errors::ToolError;
pub use mcp::{McpClient, McpError, register_mcp_tools};
pub use registry::{ToolDefinition, ToolHandler, ToolRegistry};
