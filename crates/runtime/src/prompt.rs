//! Request assembly.
//!
//! Merges the system preamble, the declared output shape, the tool
//! catalogue, and the conversation history into one request payload.
//! Assembly is deterministic: the same inputs always produce the same
//! request, with no timestamps or randomness, so prompts stay reproducible
//! and provider-side caching stays effective.

use crate::model::{Message, ModelRequest, ToolSpec};
use schema::Schema;
use std::fmt::Write as _;

/// Default system preamble for assembled requests.
pub const DEFAULT_PREAMBLE: &str = "You are a precise assistant embedded in an application. \
     Follow the output instructions exactly.";

/// A fully assembled request payload.
///
/// Built fresh for every provider call; a retry gets a new `Request` with
/// the feedback message already part of the conversation.
#[derive(Debug, Clone)]
pub struct Request {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl Request {
    /// Borrow this request in the form backends consume.
    pub fn as_model_request(&self) -> ModelRequest<'_> {
        ModelRequest {
            system: Some(&self.system),
            messages: &self.messages,
            tools: &self.tools,
        }
    }
}

/// Builds provider requests from conversation state.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    preamble: String,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Replace the default preamble.
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Assemble a request from the conversation, the target shape, and the
    /// available tools.
    pub fn build(
        &self,
        conversation: &[Message],
        target: Option<&Schema>,
        tools: &[ToolSpec],
    ) -> Request {
        let mut system = self.preamble.clone();

        if let Some(schema) = target {
            let _ = write!(system, "\n\n{}", schema.describe());
        }

        if !tools.is_empty() {
            system.push_str("\n\nAvailable tools:");
            for tool in tools {
                let _ = write!(
                    system,
                    "\n- {}: {} (arguments: {})",
                    tool.name, tool.description, tool.input_schema
                );
            }
        }

        Request {
            system,
            messages: conversation.to_vec(),
            tools: tools.to_vec(),
        }
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{Field, FieldType};
    use serde_json::json;

    fn person() -> Schema {
        Schema::new("person")
            .field(Field::new("name", FieldType::String))
            .field(Field::new("age", FieldType::Integer).minimum(0.0))
    }

    fn weather_spec() -> ToolSpec {
        ToolSpec {
            name: "get_weather".into(),
            description: "Current weather for a city".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn build_is_deterministic() {
        let assembler = PromptAssembler::new();
        let conversation = vec![Message::user("hi")];
        let schema = person();
        let tools = vec![weather_spec()];

        let a = assembler.build(&conversation, Some(&schema), &tools);
        let b = assembler.build(&conversation, Some(&schema), &tools);
        assert_eq!(a.system, b.system);
        assert_eq!(a.messages.len(), b.messages.len());
    }

    #[test]
    fn schema_description_included_when_supplied() {
        let assembler = PromptAssembler::new();
        let request = assembler.build(&[], Some(&person()), &[]);
        assert!(request.system.contains("\"person\""));
        assert!(request.system.contains("\"age\""));

        let bare = assembler.build(&[], None, &[]);
        assert!(!bare.system.contains("person"));
    }

    #[test]
    fn tool_catalogue_lists_names_and_arguments() {
        let assembler = PromptAssembler::new();
        let request = assembler.build(&[], None, &[weather_spec()]);
        assert!(request.system.contains("get_weather"));
        assert!(request.system.contains("Current weather for a city"));
        assert!(request.system.contains("\"type\":\"object\""));
    }

    #[test]
    fn conversation_order_preserved() {
        let assembler = PromptAssembler::new();
        let conversation = vec![
            Message::user("first"),
            Message::assistant("second"),
            Message::user("third"),
        ];
        let request = assembler.build(&conversation, None, &[]);
        let texts: Vec<String> = request.messages.iter().map(Message::text).collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }
}
