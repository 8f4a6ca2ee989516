//! Test-only helpers: scripted model clients, tool-call builders, and fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::message::{Message, ToolCall};
use crate::core::property::PropertyDefinition;
use crate::core::response::ToolResponse;
use crate::core::results::TokenUsage;
use crate::io::model::{ModelClient, ModelRequest, ModelResponse};
use crate::tools::{Tool, ToolArgs, ToolContext, ToolDefinition, ToolError};

/// Copy of a request the scripted client received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

impl RecordedRequest {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Model client that replays queued responses in order.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: RefCell<VecDeque<Result<ModelResponse, String>>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().map(Ok).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Queue a transport failure after the already queued responses.
    pub fn push_failure(&self, message: &str) {
        self.responses.borrow_mut().push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn assert_drained(&self) {
        let remaining = self.responses.borrow().len();
        assert_eq!(remaining, 0, "scripted client has {remaining} unused responses");
    }
}

impl ModelClient for ScriptedClient {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        self.requests.borrow_mut().push(RecordedRequest {
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tools: request.tools.to_vec(),
        });
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted client has no responses left")),
        }
    }
}

/// A tool call with JSON arguments and a generated id.
pub fn call(name: &str, args: Value) -> ToolCall {
    ToolCall {
        id: Some(format!("call-{name}")),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A tool call whose raw argument payload is passed through verbatim.
pub fn raw_call(name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: Some(format!("call-{name}")),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// A model turn with the given calls and a fixed usage of 10 in / 1 out.
pub fn turn(tool_calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse {
        content: None,
        tool_calls,
        usage: TokenUsage::new(10, 1),
    }
}

/// A model turn that makes no tool calls.
pub fn empty_turn() -> ModelResponse {
    turn(Vec::new())
}

/// Tool that answers with a fixed response and records its arguments.
#[derive(Clone)]
pub struct EchoTool {
    name: String,
    properties: Vec<PropertyDefinition>,
    response: ToolResponse,
    calls: Arc<Mutex<Vec<ToolArgs>>>,
}

impl EchoTool {
    pub fn new(name: &str, response: ToolResponse) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            response,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    /// Shared handle to the recorded call arguments.
    pub fn calls(&self) -> Arc<Mutex<Vec<ToolArgs>>> {
        Arc::clone(&self.calls)
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Test tool {}.", self.name)
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        self.properties.clone()
    }

    fn execute(&self, args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("echo tool call log poisoned"))?
            .push(args.clone());
        Ok(self.response.clone())
    }
}

/// Temporary code base with a small fixed layout.
///
/// ```text
/// /Cargo.toml
/// /README.md
/// /src/main.rs
/// /src/util/strings.rs
/// ```
pub struct TestCodeBase {
    temp: TempDir,
}

impl TestCodeBase {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::create_dir_all(root.join("src/util"))?;
        fs::create_dir_all(root.join(".git"))?;
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n")?;
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"demo\"\n")?;
        fs::write(root.join("README.md"), "# Demo\n")?;
        fs::write(
            root.join("src/main.rs"),
            "fn main() {\n    println!(\"{}\", util::strings::greet(\"world\"));\n}\n",
        )?;
        fs::write(
            root.join("src/util/strings.rs"),
            "pub fn greet(name: &str) -> String {\n    format!(\"hello {name}\")\n}\n",
        )?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
