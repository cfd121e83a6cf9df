//! End-to-end structured exchange against a live backend.
//!
//! Run with: cargo run --example structured_chat
//!
//! Requires ANTHROPIC_API_KEY (or OPENAI_API_KEY with MARLIN_CONFIG pointing
//! at a config selecting the openai provider).

use std::sync::Arc;

use runtime::{
    AnthropicBackend, Config, Exchange, ExchangeRequest, Message, Reply, ToolDefinition,
    ToolRegistry,
};
use schema::{Field, FieldType, Schema};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::var("MARLIN_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config::default(),
    };

    let api_key = std::env::var("ANTHROPIC_API_KEY")?;
    let backend = AnthropicBackend::builder(api_key, &config.backend.model)
        .max_tokens(config.backend.max_tokens)
        .timeout(config.backend.timeout())
        .build();

    let mut registry = ToolRegistry::new();
    registry.register(ToolDefinition::from_fn(
        "get_weather",
        "Current weather for a city",
        Schema::new("get_weather")
            .field(Field::new("city", FieldType::String).description("City name")),
        |args| async move {
            // Canned data; a real deployment would call a weather service.
            Ok(json!({"city": args["city"], "temp_c": 18, "conditions": "overcast"}))
        },
    ))?;

    let exchange = Exchange::new(backend)
        .with_tools(Arc::new(registry))
        .with_max_retries(config.exchange.max_retries)
        .with_max_tool_turns(config.exchange.max_tool_turns);

    let report = Schema::new("weather_report")
        .field(Field::new("city", FieldType::String))
        .field(Field::new("temp_c", FieldType::Number))
        .field(Field::new("summary", FieldType::String).description("One short sentence"));

    println!("Asking for a structured weather report...\n");

    let outcome = exchange
        .run(ExchangeRequest::structured(
            vec![Message::user(
                "What's the weather in Paris right now? Use the weather tool.",
            )],
            report,
        ))
        .await?;

    match outcome.reply {
        Reply::Structured(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Reply::Text(text) => println!("{text}"),
    }
    println!(
        "\ntokens: {} in / {} out, validation retries: {}",
        outcome.usage.input_tokens, outcome.usage.output_tokens, outcome.retries_used
    );

    Ok(())
}
