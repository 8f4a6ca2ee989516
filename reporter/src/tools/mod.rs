//! Tool contract and the machinery that routes model calls to tools.
//!
//! A [`Tool`] declares its parameters as [`PropertyDefinition`]s; the
//! [`Dispatcher`] validates every call against them before `execute` runs, so
//! tools can rely on required arguments being present and well typed.

pub mod code;
pub mod dispatcher;
pub mod done;
pub mod registry;
pub mod state;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::errors::MalformedResponse;
use crate::core::property::PropertyDefinition;
use crate::core::response::ToolResponse;

pub use dispatcher::Dispatcher;
pub use done::{DONE_TOOL, DoneTool};
pub use registry::ToolRegistry;
pub use state::ResourceCache;

/// Validated call arguments, keyed by property name.
pub type ToolArgs = Map<String, Value>;

/// A capability the model may invoke.
///
/// Tools are shared by every run of an [`crate::agent::Agent`], including runs
/// on other threads; per-run state belongs in the [`ResourceCache`].
pub trait Tool: Send + Sync {
    /// Stable identifier, unique within one dispatcher.
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn properties(&self) -> Vec<PropertyDefinition>;

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError>;
}

/// Failure raised from [`Tool::execute`].
///
/// `Malformed` is shown to the model as a retry message; `Fatal` aborts the run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

/// Per-run state handed to each tool execution.
pub struct ToolContext<'a> {
    cache: &'a mut ResourceCache,
    model: &'a str,
}

impl<'a> ToolContext<'a> {
    pub fn new(cache: &'a mut ResourceCache, model: &'a str) -> Self {
        Self { cache, model }
    }

    pub fn cache(&mut self) -> &mut ResourceCache {
        self.cache
    }

    /// Model of the run executing this tool; sub-agent tools inherit it.
    pub fn model(&self) -> &str {
        self.model
    }
}

/// Model-facing function definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        let properties = tool.properties();
        let schema: Map<String, Value> = properties
            .iter()
            .map(|p| (p.name().to_string(), p.to_descriptor()))
            .collect();
        let required: Vec<&str> = properties
            .iter()
            .filter(|p| p.is_required())
            .map(PropertyDefinition::name)
            .collect();
        Self {
            name: tool.name().to_string(),
            description: tool.description(),
            parameters: json!({
                "type": "object",
                "properties": schema,
                "required": required,
            }),
        }
    }
}

/// Read an optional string argument.
pub fn str_arg<'a>(args: &'a ToolArgs, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}
