//! The exchange loop: one logical request/response cycle with a caller,
//! potentially spanning several provider calls for tool turns and
//! validation retries.
//!
//! The loop is strictly sequential; its suspension points are the provider
//! call and each tool invocation, and the caller's cancellation token is
//! observed at every one of them. Tool turns are normal conversation
//! progress and never consume the validation retry budget; transient
//! transport retries live inside the backend and are invisible here.

use crate::error::{Error, Result};
use crate::model::{Backend, Message, Usage};
use crate::prompt::PromptAssembler;
use crate::tools::ToolRegistry;
use schema::{Schema, ValidationError};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_MAX_TOOL_TURNS: u32 = 10;

/// One request to run through the loop.
pub struct ExchangeRequest {
    pub history: Vec<Message>,
    pub schema: Option<Schema>,
    /// Overrides the exchange-level default when set.
    pub retry_budget: Option<u32>,
    pub cancel: CancellationToken,
}

impl ExchangeRequest {
    /// A free-text request: the first text response is returned unvalidated.
    pub fn text(history: Vec<Message>) -> Self {
        Self {
            history,
            schema: None,
            retry_budget: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A structured request validated against `schema`.
    pub fn structured(history: Vec<Message>, schema: Schema) -> Self {
        Self {
            schema: Some(schema),
            ..Self::text(history)
        }
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = Some(budget);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The final reply of a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Validated and coerced to the requested schema.
    Structured(Value),
}

/// Successful terminal state of an exchange.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub reply: Reply,
    /// Token usage summed over every provider call of the exchange.
    pub usage: Usage,
    /// Validation retries that were consumed.
    pub retries_used: u32,
}

/// Drives exchanges against one backend and one tool registry.
///
/// The registry is shared and read-only; conversation state lives in each
/// [`ExchangeRequest`], so one `Exchange` can serve many concurrent
/// conversations.
pub struct Exchange<B: Backend> {
    backend: B,
    tools: Arc<ToolRegistry>,
    assembler: PromptAssembler,
    max_retries: u32,
    max_tool_turns: u32,
}

impl<B: Backend> Exchange<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tools: Arc::new(ToolRegistry::new()),
            assembler: PromptAssembler::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Default validation retry budget for requests that don't override it.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Upper bound on consecutive tool turns within one exchange.
    pub fn with_max_tool_turns(mut self, max_tool_turns: u32) -> Self {
        self.max_tool_turns = max_tool_turns;
        self
    }

    /// Run one exchange to a terminal state.
    pub async fn run(&self, request: ExchangeRequest) -> Result<Outcome> {
        let id = Uuid::new_v4();
        let budget = request.retry_budget.unwrap_or(self.max_retries);
        let mut history = request.history;
        let mut usage = Usage::default();
        let mut retries_used = 0u32;
        let mut tool_turns = 0u32;

        debug!(exchange = %id, budget, structured = request.schema.is_some(), "exchange start");

        loop {
            if request.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let prompt = self
                .assembler
                .build(&history, request.schema.as_ref(), self.tools.specs());

            let response = tokio::select! {
                biased;
                _ = request.cancel.cancelled() => return Err(Error::Cancelled),
                result = self.backend.complete(prompt.as_model_request()) => result?,
            };
            usage.add(response.usage);

            let message = response.message;
            history.push(message.clone());

            let calls = message.tool_calls();
            if !calls.is_empty() {
                tool_turns += 1;
                if tool_turns > self.max_tool_turns {
                    return Err(Error::ToolTurnLimit(self.max_tool_turns));
                }
                for call in &calls {
                    if request.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    debug!(exchange = %id, tool = %call.name, "tool turn");
                    let result = self.tools.dispatch(call).await;
                    history.push(result);
                }
                continue;
            }

            let text = message.text();
            let Some(schema) = &request.schema else {
                info!(exchange = %id, retries_used, "exchange done");
                return Ok(Outcome {
                    reply: Reply::Text(text),
                    usage,
                    retries_used,
                });
            };

            match schema.validate_text(&text) {
                Ok(value) => {
                    info!(exchange = %id, retries_used, "exchange done");
                    return Ok(Outcome {
                        reply: Reply::Structured(value),
                        usage,
                        retries_used,
                    });
                }
                Err(failure) => {
                    if retries_used >= budget {
                        return Err(Error::Exhausted {
                            retries: retries_used,
                            last: failure,
                        });
                    }
                    retries_used += 1;
                    debug!(exchange = %id, retries_used, %failure, "validation failed, retrying");
                    history.push(retry_feedback(&failure));
                }
            }
        }
    }
}

/// The feedback message appended before a validation retry.
fn retry_feedback(failure: &ValidationError) -> Message {
    Message::user(format!(
        "The previous reply did not match the required output shape:\n{}\n\
         Reply again with a corrected JSON object and nothing else.",
        failure.bullet_list()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall};
    use crate::tools::{ToolDefinition, ToolRegistry};
    use schema::{Field, FieldType};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that replays a scripted list of responses.
    #[derive(Default)]
    struct ScriptedBackend {
        responses: Mutex<Vec<ModelResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<ModelResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Backend for ScriptedBackend {
        async fn complete(
            &self,
            _request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ModelError::Api("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            message: Message::assistant(text),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn tool_call_response(id: &str, name: &str, arguments: Value) -> ModelResponse {
        ModelResponse {
            message: Message::from_parts(
                Role::Assistant,
                vec![Part::ToolCall(ToolCall {
                    id: id.into(),
                    name: name.into(),
                    arguments,
                })],
            ),
            usage: Usage::default(),
        }
    }

    fn person() -> Schema {
        Schema::new("person")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("age", FieldType::Integer).minimum(0.0))
    }

    fn weather_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::from_fn(
                "get_weather",
                "Current weather for a city",
                Schema::new("get_weather").field(Field::new("city", FieldType::String)),
                |args| async move { Ok(json!({"city": args["city"], "temp_c": 18})) },
            ))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn plain_text_returned_without_validation() {
        let backend = ScriptedBackend::new(vec![text_response("hello there")]);
        let exchange = Exchange::new(backend);
        let outcome = exchange
            .run(ExchangeRequest::text(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(outcome.reply, Reply::Text("hello there".into()));
        assert_eq!(outcome.retries_used, 0);
    }

    #[tokio::test]
    async fn invalid_then_valid_response_consumes_one_retry() {
        let backend = ScriptedBackend::new(vec![
            text_response(r#"{"name": "Ann", "age": -1}"#),
            text_response(r#"{"name": "Ann", "age": 5}"#),
        ]);
        let exchange = Exchange::new(backend);
        let outcome = exchange
            .run(ExchangeRequest::structured(
                vec![Message::user("who?")],
                person(),
            ))
            .await
            .unwrap();
        assert_eq!(
            outcome.reply,
            Reply::Structured(json!({"name": "Ann", "age": 5}))
        );
        assert_eq!(outcome.retries_used, 1);
    }

    #[tokio::test]
    async fn budget_bounds_validation_retries() {
        let backend = ScriptedBackend::new(vec![
            text_response("not json"),
            text_response("still not json"),
            text_response("nope"),
            text_response("never"),
        ]);
        let exchange = Exchange::new(backend);
        let err = exchange
            .run(
                ExchangeRequest::structured(vec![Message::user("who?")], person())
                    .retry_budget(2),
            )
            .await
            .unwrap_err();
        let Error::Exhausted { retries, .. } = err else {
            panic!("expected exhaustion, got {err}");
        };
        assert_eq!(retries, 2);
        // budget N means N retries after the initial attempt
        assert_eq!(exchange.backend.calls(), 3);
    }

    #[tokio::test]
    async fn zero_budget_fails_on_first_invalid_response() {
        let backend = ScriptedBackend::new(vec![text_response("not json")]);
        let exchange = Exchange::new(backend);
        let err = exchange
            .run(
                ExchangeRequest::structured(vec![Message::user("who?")], person())
                    .retry_budget(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Exhausted { retries: 0, .. }));
        assert_eq!(exchange.backend.calls(), 1);
    }

    #[tokio::test]
    async fn tool_turns_do_not_consume_retry_budget() {
        let backend = ScriptedBackend::new(vec![
            tool_call_response("c1", "get_weather", json!({"city": "Paris"})),
            tool_call_response("c2", "get_weather", json!({"city": "Oslo"})),
            text_response("not json"),
            text_response(r#"{"name": "Ann", "age": 5}"#),
        ]);
        let exchange = Exchange::new(backend)
            .with_tools(weather_registry())
            .with_max_retries(1);
        let outcome = exchange
            .run(ExchangeRequest::structured(
                vec![Message::user("who?")],
                person(),
            ))
            .await
            .unwrap();
        // Two tool turns, then one validation failure within the budget of 1.
        assert_eq!(outcome.retries_used, 1);
        assert_eq!(exchange.backend.calls(), 4);
    }

    #[tokio::test]
    async fn tool_result_fed_back_into_conversation() {
        let backend = ScriptedBackend::new(vec![
            tool_call_response("c1", "get_weather", json!({"city": "Paris"})),
            text_response("warm enough"),
        ]);
        let exchange = Exchange::new(backend).with_tools(weather_registry());
        let outcome = exchange
            .run(ExchangeRequest::text(vec![Message::user(
                "weather in paris?",
            )]))
            .await
            .unwrap();
        assert_eq!(outcome.reply, Reply::Text("warm enough".into()));
        assert_eq!(exchange.backend.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_reported_and_conversation_continues() {
        let backend = ScriptedBackend::new(vec![
            tool_call_response("c1", "no_such_tool", json!({})),
            text_response("recovered"),
        ]);
        let exchange = Exchange::new(backend).with_tools(weather_registry());
        let outcome = exchange
            .run(ExchangeRequest::text(vec![Message::user("go")]))
            .await
            .unwrap();
        assert_eq!(outcome.reply, Reply::Text("recovered".into()));
    }

    #[tokio::test]
    async fn tool_turn_limit_is_terminal() {
        let backend = ScriptedBackend::new(vec![
            tool_call_response("c1", "get_weather", json!({"city": "Paris"})),
            tool_call_response("c2", "get_weather", json!({"city": "Paris"})),
            tool_call_response("c3", "get_weather", json!({"city": "Paris"})),
        ]);
        let exchange = Exchange::new(backend)
            .with_tools(weather_registry())
            .with_max_tool_turns(2);
        let err = exchange
            .run(ExchangeRequest::text(vec![Message::user("loop")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolTurnLimit(2)));
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_provider_calls() {
        let backend = ScriptedBackend::new(vec![text_response("never seen")]);
        let exchange = Exchange::new(backend);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exchange
            .run(ExchangeRequest::text(vec![Message::user("hi")]).cancel_token(cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(exchange.backend.calls(), 0);
    }

    #[tokio::test]
    async fn usage_summed_across_calls() {
        let backend = ScriptedBackend::new(vec![
            text_response("not json"),
            text_response(r#"{"name": "Ann", "age": 5}"#),
        ]);
        let exchange = Exchange::new(backend);
        let outcome = exchange
            .run(ExchangeRequest::structured(
                vec![Message::user("who?")],
                person(),
            ))
            .await
            .unwrap();
        assert_eq!(outcome.usage.input_tokens, 20);
        assert_eq!(outcome.usage.output_tokens, 10);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_model_error() {
        let backend = ScriptedBackend::new(Vec::new());
        let exchange = Exchange::new(backend);
        let err = exchange
            .run(ExchangeRequest::text(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[test]
    fn retry_feedback_lists_field_errors() {
        let failure = ValidationError::new(vec![schema::FieldError::new(
            "age",
            "must be at least 0, got -1",
        )]);
        let message = retry_feedback(&failure);
        assert_eq!(message.role, Role::User);
        assert!(message.text().contains("age: must be at least 0, got -1"));
    }
}
