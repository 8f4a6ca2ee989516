//! OpenAI-compatible chat completions client (blocking).

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::core::message::{Message, ToolCall};
use crate::core::results::TokenUsage;
use crate::io::model::{ModelClient, ModelRequest, ModelResponse};

/// Call id sent back for tool messages whose call carried none.
const MISSING_CALL_ID: &str = "-";
/// Every turn must be answered with tool calls.
const TOOL_CHOICE: &str = "required";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub temperature: f64,
    pub top_p: f64,
}

pub struct OpenAiClient {
    http: Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

impl ModelClient for OpenAiClient {
    #[instrument(skip_all, fields(model = request.model, messages = request.messages.len(), tools = request.tools.len()))]
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let payload = ChatRequest {
            model: request.model,
            messages: request.messages.iter().map(wire_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| json!({"type": "function", "function": tool}))
                .collect(),
            tool_choice: TOOL_CHOICE,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };
        info!("sending chat completion request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .context("send chat completion request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("chat completion failed with {status}: {body}");
        }
        let parsed: ChatResponse = response.json().context("parse chat completion response")?;
        let response = into_model_response(parsed);
        debug!(
            tool_calls = response.tool_calls.len(),
            input_tokens = response.usage.input,
            output_tokens = response.usage.output,
            "received chat completion"
        );
        Ok(response)
    }
}

fn wire_message(message: &Message) -> Value {
    match message {
        Message::System(text) => json!({"role": "system", "content": text}),
        Message::User(text) => json!({"role": "user", "content": text}),
        Message::UserImages(images) => json!({
            "role": "user",
            "content": images
                .iter()
                .map(|image| json!({
                    "type": "image_url",
                    "image_url": {"url": image.to_data_uri(), "detail": "high"},
                }))
                .collect::<Vec<_>>(),
        }),
        Message::Assistant {
            content,
            tool_calls,
        } => json!({
            "role": "assistant",
            "content": content,
            "tool_calls": tool_calls
                .iter()
                .map(|call| json!({
                    "id": call.id.as_deref().unwrap_or(MISSING_CALL_ID),
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments},
                }))
                .collect::<Vec<_>>(),
        }),
        Message::Tool {
            tool_call_id,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id.as_deref().unwrap_or(MISSING_CALL_ID),
            "content": content,
        }),
    }
}

fn into_model_response(parsed: ChatResponse) -> ModelResponse {
    let usage = parsed
        .usage
        .map(|usage| TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or_default();
    let Some(choice) = parsed.choices.into_iter().next() else {
        return ModelResponse {
            usage,
            ..ModelResponse::default()
        };
    };
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();
    ModelResponse {
        content: choice.message.content,
        tool_calls,
        usage,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    tools: Vec<Value>,
    tool_choice: &'static str,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: Option<String>,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
