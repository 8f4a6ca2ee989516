//! The reserved completion tool.

use crate::core::property::PropertyDefinition;
use crate::core::response::ToolResponse;
use crate::tools::{Tool, ToolArgs, ToolContext, ToolError};

pub const DONE_TOOL: &str = "done";

/// Ends the run; its parameters are the prompt's output properties.
#[derive(Debug, Clone)]
pub struct DoneTool {
    properties: Vec<PropertyDefinition>,
}

impl DoneTool {
    pub fn new(properties: Vec<PropertyDefinition>) -> Self {
        Self { properties }
    }
}

impl Tool for DoneTool {
    fn name(&self) -> &str {
        DONE_TOOL
    }

    fn description(&self) -> String {
        "Finish your analysis.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        self.properties.clone()
    }

    fn execute(&self, args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        Ok(ToolResponse::Done(args.clone()))
    }
}
