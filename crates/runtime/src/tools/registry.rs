//! Tool definitions and the dispatch registry.

use crate::model::{Message, ToolCall, ToolResult, ToolSpec};
use crate::tools::ToolError;
use async_trait::async_trait;
use schema::Schema;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// An invocable tool implementation.
///
/// Implementations receive arguments that have already been validated and
/// coerced when the definition declares an argument schema. Failures are
/// returned, never panicked: whatever comes back here ends up as message
/// content in the conversation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.0)(arguments).await
    }
}

/// A registered tool: its model-facing spec, its argument schema, and the
/// handler to invoke.
#[derive(Clone)]
pub struct ToolDefinition {
    spec: ToolSpec,
    arguments: Option<Schema>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Define a tool whose arguments are validated against `arguments`
    /// before the handler runs.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Schema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        let spec = ToolSpec {
            name: name.into(),
            description: description.into(),
            input_schema: arguments.json_schema(),
        };
        Self {
            spec,
            arguments: Some(arguments),
            handler: Arc::new(handler),
        }
    }

    /// Define a tool from an async closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Schema,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self::new(name, description, arguments, FnHandler(f))
    }

    /// Define a tool with a pre-built spec and no local argument validation.
    /// Used for external tools that validate on their own side.
    pub fn raw(spec: ToolSpec, handler: impl ToolHandler + 'static) -> Self {
        Self {
            spec,
            arguments: None,
            handler: Arc::new(handler),
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Name-keyed set of tool definitions.
///
/// Populated before any exchange begins; names are unique. Dispatch looks up
/// the call's name, validates arguments, invokes the handler, and always
/// produces a tool-role [`Message`] regardless of outcome.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    // Registration order, kept so the advertised spec list is deterministic.
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool definition. Names must be unique.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        let name = definition.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.specs.push(definition.spec().clone());
        self.tools.insert(name, definition);
        Ok(())
    }

    /// Tool specs in registration order.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Execute a tool call and report the outcome as a tool-role message.
    ///
    /// Unknown names, argument mismatches, and handler failures all become
    /// failure results inside the returned message.
    pub async fn dispatch(&self, call: &ToolCall) -> Message {
        let result = self.run(call).await;
        if let ToolResult::Failure { error, .. } = &result {
            warn!(tool = %call.name, %error, "tool call failed");
        }
        Message::tool_results(vec![result])
    }

    async fn run(&self, call: &ToolCall) -> ToolResult {
        let Some(definition) = self.tools.get(&call.name) else {
            return ToolResult::failure(&call.id, ToolError::Unknown(call.name.clone()));
        };

        let arguments = match &definition.arguments {
            Some(schema) => match schema.validate(&call.arguments) {
                Ok(coerced) => coerced,
                Err(err) => return ToolResult::failure(&call.id, ToolError::from(err)),
            },
            None => call.arguments.clone(),
        };

        debug!(tool = %call.name, "invoking tool");
        match definition.handler.invoke(arguments).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(err) => ToolResult::failure(&call.id, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Part;
    use crate::model::Role;
    use schema::{Field, FieldType};
    use serde_json::json;

    fn weather_tool() -> ToolDefinition {
        ToolDefinition::from_fn(
            "get_weather",
            "Current weather for a city",
            Schema::new("get_weather").field(Field::new("city", FieldType::String)),
            |args| async move {
                let city = args["city"].as_str().unwrap_or_default().to_string();
                Ok(json!({"city": city, "temp_c": 18}))
            },
        )
    }

    fn single_result(message: &Message) -> &ToolResult {
        assert_eq!(message.role, Role::Tool);
        match &message.parts[..] {
            [Part::ToolResult(result)] => result,
            parts => panic!("expected one tool result, got {parts:?}"),
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(weather_tool()).unwrap();
        let err = registry.register(weather_tool()).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "get_weather"));
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(weather_tool()).unwrap();

        let call = ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: json!({"city": "Paris"}),
        };
        let message = registry.dispatch(&call).await;
        match single_result(&message) {
            ToolResult::Success {
                tool_call_id,
                output,
            } => {
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(output["city"], "Paris");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failure_message() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nope".into(),
            arguments: Value::Null,
        };
        let message = registry.dispatch(&call).await;
        match single_result(&message) {
            ToolResult::Failure { error, .. } => {
                assert!(matches!(error, ToolError::Unknown(name) if name == "nope"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_name_the_field() {
        let mut registry = ToolRegistry::new();
        registry.register(weather_tool()).unwrap();

        let call = ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: json!({}),
        };
        let message = registry.dispatch(&call).await;
        match single_result(&message) {
            ToolResult::Failure {
                error: ToolError::InvalidArguments(err),
                ..
            } => {
                assert_eq!(err.errors[0].field, "city");
            }
            other => panic!("expected invalid arguments, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handler_error_is_captured_not_propagated() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::from_fn(
                "broken",
                "Always fails",
                Schema::new("broken"),
                |_| async { Err(ToolError::Execution("boom".into())) },
            ))
            .unwrap();

        let call = ToolCall {
            id: "call_1".into(),
            name: "broken".into(),
            arguments: json!({}),
        };
        let message = registry.dispatch(&call).await;
        assert!(single_result(&message).is_failure());
    }

    #[tokio::test]
    async fn arguments_are_coerced_before_invocation() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::from_fn(
                "wait",
                "Sleep for a number of seconds",
                Schema::new("wait").field(Field::new("seconds", FieldType::Integer)),
                |args| async move {
                    assert_eq!(args["seconds"], 3);
                    Ok(Value::Null)
                },
            ))
            .unwrap();

        let call = ToolCall {
            id: "call_1".into(),
            name: "wait".into(),
            arguments: json!({"seconds": "3"}),
        };
        let message = registry.dispatch(&call).await;
        assert!(!single_result(&message).is_failure());
    }
}
