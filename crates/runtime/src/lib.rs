//! Marlin runtime — model abstraction and structured exchanges.
//!
//! This crate wires an LLM backend into an application with typed
//! inputs/outputs: a uniform interface over chat providers, plus the loop
//! that coerces a model's free-text or tool-call responses into a
//! caller-declared schema, retrying on validation failure.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **Backend**: a trait abstracting LLM providers (Anthropic,
//!   OpenAI-compatible), with completion and optional streaming.
//! - **ToolRegistry**: named tools the model may call, registered once at
//!   setup and dispatched during exchanges.
//! - **Exchange**: the driving loop for one logical request, spanning tool
//!   turns and validation retries, with a bounded budget and cancellation.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{AnthropicBackend, Exchange, ExchangeRequest, Message, Reply};
//! use schema::{Field, FieldType, Schema};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = AnthropicBackend::builder("sk-ant-api01-...", "claude-sonnet-4-20250514").build();
//! let exchange = Exchange::new(backend);
//!
//! let person = Schema::new("person")
//!     .field(Field::new("name", FieldType::String))
//!     .field(Field::new("age", FieldType::Integer).minimum(0.0));
//!
//! let outcome = exchange
//!     .run(ExchangeRequest::structured(
//!         vec![Message::user("Extract: Ann, age five.")],
//!         person,
//!     ))
//!     .await?;
//!
//! if let Reply::Structured(value) = outcome.reply {
//!     println!("{value}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod exchange;
pub mod model;
mod prompt;
mod providers;
pub mod tools;

// Model protocol types (provider-agnostic)
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, ResponseStream, Role,
    StreamChunk, ToolCall, ToolResult, ToolSpec, Usage,
};

// Provider backends
pub use providers::{
    AnthropicBackend, AnthropicBackendBuilder, OpenAiBackend, OpenAiBackendBuilder,
};

// Tool registration and dispatch
pub use tools::{
    McpClient, McpError, ToolDefinition, ToolError, ToolHandler, ToolRegistry,
    register_mcp_tools,
};

// Request assembly
pub use prompt::{PromptAssembler, Request};

// Exchange loop
pub use exchange::{Exchange, ExchangeRequest, Outcome, Reply};

// Configuration
pub use config::{BackendConfig, Config, ExchangeConfig, Provider};

// Error types
pub use error::{Error, Result};
