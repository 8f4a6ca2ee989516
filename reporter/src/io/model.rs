//! Model transport abstraction.
//!
//! The [`ModelClient`] trait decouples the run loop from the chat completion
//! backend. Tests use scripted clients that return predetermined tool calls
//! without any network access.

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::message::{Message, ToolCall};
use crate::core::results::TokenUsage;
use crate::tools::{DONE_TOOL, ToolDefinition};

/// One chat completion round-trip. The model must answer with tool calls.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    /// May be empty; the run loop treats that as "no action this round".
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Abstraction over chat completion backends.
pub trait ModelClient {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse>;
}

impl<C: ModelClient + ?Sized> ModelClient for &C {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        (**self).complete(request)
    }
}

impl<C: ModelClient + ?Sized> ModelClient for Box<C> {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        (**self).complete(request)
    }
}

/// Dry-run client: immediately calls `done` with placeholder values.
///
/// Useful for checking configuration and prompt rendering without spending
/// tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClient;

impl ModelClient for NullClient {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let done = request
            .tools
            .iter()
            .find(|tool| tool.name == DONE_TOOL)
            .ok_or_else(|| anyhow!("request does not offer the '{DONE_TOOL}' tool"))?;
        let arguments = placeholder_arguments(&done.parameters);
        debug!(arguments = %arguments, "null client answering with done");
        Ok(ModelResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: Some("null-0".to_string()),
                name: DONE_TOOL.to_string(),
                arguments: arguments.to_string(),
            }],
            usage: TokenUsage::default(),
        })
    }
}

/// Values that satisfy a `{type: object, properties}` schema.
fn placeholder_arguments(parameters: &Value) -> Value {
    let mut args = Map::new();
    if let Some(properties) = parameters.get("properties").and_then(Value::as_object) {
        for (name, descriptor) in properties {
            args.insert(name.clone(), placeholder_value(descriptor));
        }
    }
    Value::Object(args)
}

fn placeholder_value(descriptor: &Value) -> Value {
    if let Some(first) = descriptor
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        return first.clone();
    }
    let minimum = descriptor.get("minimum").cloned();
    match descriptor.get("type").and_then(Value::as_str) {
        Some("integer") => minimum.unwrap_or(json!(0)),
        Some("number") => minimum.unwrap_or(json!(0.0)),
        Some("boolean") => json!(false),
        Some("object") => json!({}),
        Some("array") => json!([]),
        _ => json!(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::property::{PropertyDefinition, PropertyType};
    use crate::tools::{DoneTool, Tool};

    #[test]
    fn null_client_fills_done_with_valid_placeholders() {
        let done = DoneTool::new(vec![
            PropertyDefinition::string("summary").required(),
            PropertyDefinition::new("severity", PropertyType::Enum).with_choices(["low", "high"]),
            PropertyDefinition::new("score", PropertyType::Integer).with_range(1.0, 5.0),
            PropertyDefinition::new("tags", PropertyType::Array),
        ]);
        let definitions = vec![ToolDefinition::from_tool(&done as &dyn Tool)];
        let response = NullClient
            .complete(&ModelRequest {
                model: "m",
                messages: &[],
                tools: &definitions,
            })
            .expect("complete");
        assert_eq!(response.tool_calls.len(), 1);
        let args: Value = serde_json::from_str(&response.tool_calls[0].arguments).expect("json");
        assert_eq!(
            args,
            json!({"summary": "", "severity": "low", "score": 1, "tags": []})
        );
        for property in done.properties() {
            let value = args.get(property.name());
            assert!(property.check_type(value));
            assert!(property.check_range(value));
            assert!(property.check_choices(value));
        }
    }

    #[test]
    fn null_client_requires_done_tool() {
        let err = NullClient
            .complete(&ModelRequest {
                model: "m",
                messages: &[],
                tools: &[],
            })
            .expect_err("no done tool");
        assert!(err.to_string().contains("done"));
    }
}
