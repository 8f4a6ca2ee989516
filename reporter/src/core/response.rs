//! What a tool hands back to the run loop.

use serde_json::{Map, Value};

use crate::core::image::Image;
use crate::core::prompt::Prompt;

/// Output values of a finished run, keyed by output property name.
pub type Values = Map<String, Value>;

/// The closed set of tool results.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    /// Text (and optional images) surfaced back to the model.
    Message { text: String, images: Vec<Image> },
    /// Terminates the run with these values.
    Done(Values),
    /// Run a nested agent; its `report` comes back as a message.
    Prompt(Box<Prompt>),
}

impl ToolResponse {
    pub fn message(text: impl Into<String>) -> Self {
        ToolResponse::Message {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolResponse::Message { .. } => "message",
            ToolResponse::Done(_) => "done",
            ToolResponse::Prompt(_) => "prompt",
        }
    }
}

/// A response annotated with the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub tool: String,
    pub call_id: Option<String>,
    pub response: ToolResponse,
}
