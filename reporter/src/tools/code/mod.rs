//! Code base analysis tools.
//!
//! - `code` collection: a sub-agent tool. The parent model picks a configured
//!   code base and a question; a nested run with the `code_base` tools answers
//!   it and reports back.
//! - `code_base` collection: the file tools the nested run works with
//!   (see [`files`]).

pub mod files;
pub mod index;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::errors::MalformedResponse;
use crate::core::property::{PropertyDefinition, PropertyType};
use crate::core::prompt::Prompt;
use crate::core::response::ToolResponse;
use crate::tools::{Tool, ToolArgs, ToolContext, ToolError, str_arg};

pub use files::code_base_tools;

pub const CODE_COLLECTION: &str = "code";
pub const CODE_BASE_COLLECTION: &str = "code_base";

pub const CODE_SYSTEM_PROMPT: &str = "Adopt the role of a quality assurance (QA) engineer.
You will be asked to perform an analysis of a code base. You have access to tools that will allow you to examine the code base. \
Perform the task in as few steps as possible. When you have reached a conclusion use the `done` tool to finish.";
pub const CODE_MAX_ITERATIONS: u32 = 15;
pub const CODE_MAX_ERROR_RETRY: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CodeToolConfig {
    code_bases: Vec<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default)]
    max_error_retry: Option<u32>,
}

/// Factory for the `code` collection.
///
/// Config: `{ "code_bases": ["<dir>", ...], "system_prompt"?, "max_iterations"?, "max_error_retry"? }`.
pub fn code_tools(config: &Value) -> Result<Vec<Box<dyn Tool>>> {
    let config: CodeToolConfig =
        serde_json::from_value(config.clone()).context("parse code tool config")?;
    if config.code_bases.is_empty() {
        bail!("code.code_bases must list at least one code base");
    }
    Ok(vec![Box::new(CodeTool { config })])
}

/// Hands a question about one code base to a nested agent run.
struct CodeTool {
    config: CodeToolConfig,
}

impl Tool for CodeTool {
    fn name(&self) -> &str {
        CODE_COLLECTION
    }

    fn description(&self) -> String {
        "Ask a large language model to examine a code base and report on its findings.".to_string()
    }

    fn properties(&self) -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::new("code_base", PropertyType::Enum)
                .with_description("The code base to examine.")
                .with_choices(self.config.code_bases.iter().cloned())
                .required(),
            PropertyDefinition::string("prompt")
                .with_description("Prompt for the large language model.")
                .required(),
        ]
    }

    fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
        let invalid = |property: &str, why: &str| MalformedResponse::PropertyInvalid {
            tool: CODE_COLLECTION.to_string(),
            property: property.to_string(),
            why: why.to_string(),
        };
        let code_base = str_arg(args, "code_base")
            .filter(|name| self.config.code_bases.iter().any(|known| known == name))
            .ok_or_else(|| invalid("code_base", "Unknown code base."))?;
        let question = str_arg(args, "prompt")
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or_else(|| invalid("prompt", "The prompt must not be empty."))?;

        let prompt = Prompt::sub_agent(question)
            .system_prompt(
                self.config
                    .system_prompt
                    .as_deref()
                    .unwrap_or(CODE_SYSTEM_PROMPT),
            )
            .model(ctx.model())
            .max_iterations(self.config.max_iterations.unwrap_or(CODE_MAX_ITERATIONS))
            .max_error_retry(self.config.max_error_retry.unwrap_or(CODE_MAX_ERROR_RETRY))
            .tool(CODE_BASE_COLLECTION, json!({ "root": code_base }))
            .build()
            .context("build code sub-agent prompt")?;
        Ok(ToolResponse::Prompt(Box::new(prompt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prompt::REPORT_PROPERTY;
    use crate::tools::{ResourceCache, ToolDefinition};

    fn tool(config: Value) -> Box<dyn Tool> {
        code_tools(&config).expect("tools").remove(0)
    }

    #[test]
    fn definition_lists_configured_code_bases() {
        let tool = tool(json!({"code_bases": ["./api", "./web"]}));
        let definition = ToolDefinition::from_tool(tool.as_ref());
        assert_eq!(
            definition.parameters["properties"]["code_base"]["enum"],
            json!(["./api", "./web"])
        );
        assert_eq!(
            definition.parameters["required"],
            json!(["code_base", "prompt"])
        );
    }

    #[test]
    fn execute_returns_sub_agent_prompt() {
        let tool = tool(json!({"code_bases": ["./api"], "max_iterations": 4}));
        let args = json!({"code_base": "./api", "prompt": "Where is auth handled?"});
        let Value::Object(args) = args else { unreachable!() };
        let mut cache = ResourceCache::new();
        let mut ctx = ToolContext::new(&mut cache, "parent-model");
        let ToolResponse::Prompt(prompt) = tool.execute(&args, &mut ctx).expect("execute") else {
            panic!("expected a prompt response");
        };
        assert_eq!(prompt.user_prompt(), "Where is auth handled?");
        assert_eq!(prompt.model(), "parent-model");
        assert_eq!(prompt.max_iterations(), 4);
        assert_eq!(prompt.max_error_retry(), CODE_MAX_ERROR_RETRY);
        assert_eq!(prompt.system_prompt(), CODE_SYSTEM_PROMPT);
        assert_eq!(prompt.output_properties()[0].name(), REPORT_PROPERTY);
        assert_eq!(prompt.tools()[CODE_BASE_COLLECTION], json!({"root": "./api"}));
    }

    #[test]
    fn empty_code_base_list_is_rejected() {
        let err = code_tools(&json!({"code_bases": []})).err().expect("empty");
        assert!(err.to_string().contains("at least one"));
    }
}
