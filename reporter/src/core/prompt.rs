//! Run requests: the immutable description of one agent invocation.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::ConfigError;
use crate::core::image::Image;
use crate::core::property::PropertyDefinition;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_MAX_ERROR_RETRY: u32 = 3;
pub const DEFAULT_SYSTEM_PROMPT: &str = "Using the tools available to you, perform an analysis of the user's message. \
Use the `done` tool to signal the completion of your analysis.";
pub const DEFAULT_MAX_ITERATION_PROMPT: &str =
    "Please complete your analysis to the best of your ability with the `done` tool.";

/// Output property every sub-agent prompt must supply.
pub const REPORT_PROPERTY: &str = "report";

/// Tool collection name to that collection's configuration.
pub type ToolConfigs = IndexMap<String, Value>;

/// `report: a summary of your analysis`, required.
pub fn report_property() -> PropertyDefinition {
    PropertyDefinition::string(REPORT_PROPERTY)
        .with_description("A summary of your analysis.")
        .required()
}

/// A validated run request. Construct through [`Prompt::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    user_prompt: String,
    system_prompt: String,
    output_properties: Vec<PropertyDefinition>,
    images: Vec<Image>,
    tools: ToolConfigs,
    model: String,
    max_iterations: u32,
    max_error_retry: u32,
    max_iteration_prompt: String,
}

impl Prompt {
    pub fn builder(user_prompt: impl Into<String>) -> PromptBuilder {
        PromptBuilder::new(user_prompt.into())
    }

    /// Builder preset for nested runs that report back a single summary.
    pub fn sub_agent(user_prompt: impl Into<String>) -> PromptBuilder {
        Self::builder(user_prompt).output_property(report_property())
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn output_properties(&self) -> &[PropertyDefinition] {
        &self.output_properties
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn tools(&self) -> &ToolConfigs {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn max_error_retry(&self) -> u32 {
        self.max_error_retry
    }

    pub fn max_iteration_prompt(&self) -> &str {
        &self.max_iteration_prompt
    }

    /// Loggable view; images are reduced to their MIME types.
    pub fn summary(&self) -> PromptSummary<'_> {
        PromptSummary {
            user_prompt: &self.user_prompt,
            system_prompt: &self.system_prompt,
            output_properties: &self.output_properties,
            images: self.images.iter().map(Image::mime).collect(),
            tools: &self.tools,
            model: &self.model,
            max_iterations: self.max_iterations,
            max_error_retry: self.max_error_retry,
            max_iteration_prompt: &self.max_iteration_prompt,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PromptSummary<'a> {
    pub user_prompt: &'a str,
    pub system_prompt: &'a str,
    pub output_properties: &'a [PropertyDefinition],
    pub images: Vec<&'a str>,
    pub tools: &'a ToolConfigs,
    pub model: &'a str,
    pub max_iterations: u32,
    pub max_error_retry: u32,
    pub max_iteration_prompt: &'a str,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    user_prompt: String,
    system_prompt: String,
    output_properties: Vec<PropertyDefinition>,
    images: Vec<Image>,
    tools: ToolConfigs,
    model: String,
    max_iterations: u32,
    max_error_retry: u32,
    max_iteration_prompt: String,
}

impl PromptBuilder {
    fn new(user_prompt: String) -> Self {
        Self {
            user_prompt,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            output_properties: Vec::new(),
            images: Vec::new(),
            tools: ToolConfigs::new(),
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_error_retry: DEFAULT_MAX_ERROR_RETRY,
            max_iteration_prompt: DEFAULT_MAX_ITERATION_PROMPT.to_string(),
        }
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn output_property(mut self, property: PropertyDefinition) -> Self {
        self.output_properties.push(property);
        self
    }

    pub fn output_properties(mut self, properties: impl IntoIterator<Item = PropertyDefinition>) -> Self {
        self.output_properties.extend(properties);
        self
    }

    pub fn image(mut self, image: Image) -> Self {
        self.images.push(image);
        self
    }

    pub fn images(mut self, images: impl IntoIterator<Item = Image>) -> Self {
        self.images.extend(images);
        self
    }

    /// Enable a tool collection. Re-adding a collection replaces its config.
    pub fn tool(mut self, collection: impl Into<String>, config: Value) -> Self {
        self.tools.insert(collection.into(), config);
        self
    }

    pub fn tools(mut self, tools: ToolConfigs) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_error_retry(mut self, max_error_retry: u32) -> Self {
        self.max_error_retry = max_error_retry;
        self
    }

    pub fn max_iteration_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.max_iteration_prompt = prompt.into();
        self
    }

    pub fn build(self) -> Result<Prompt, ConfigError> {
        non_empty("user_prompt", &self.user_prompt)?;
        non_empty("system_prompt", &self.system_prompt)?;
        non_empty("model", &self.model)?;
        non_empty("max_iteration_prompt", &self.max_iteration_prompt)?;
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.output_properties.is_empty() {
            return Err(ConfigError::NoOutputProperties);
        }
        let mut seen = HashSet::new();
        for property in &self.output_properties {
            property.validate()?;
            if !seen.insert(property.name()) {
                return Err(ConfigError::DuplicateProperty {
                    property: property.name().to_string(),
                });
            }
        }
        if let Some(index) = self.images.iter().position(Image::is_empty) {
            return Err(ConfigError::EmptyImage { index });
        }

        Ok(Prompt {
            user_prompt: self.user_prompt,
            system_prompt: self.system_prompt,
            output_properties: self.output_properties,
            images: self.images,
            tools: self.tools,
            model: self.model,
            max_iterations: self.max_iterations,
            max_error_retry: self.max_error_retry,
            max_iteration_prompt: self.max_iteration_prompt,
        })
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::property::PropertyType;

    fn person() -> PromptBuilder {
        Prompt::builder("Describe the person.")
            .output_property(PropertyDefinition::string("name").required())
            .output_property(PropertyDefinition::new("age", PropertyType::Integer))
    }

    #[test]
    fn builder_applies_defaults() {
        let prompt = person().build().expect("build");
        assert_eq!(prompt.model(), DEFAULT_MODEL);
        assert_eq!(prompt.max_iterations(), 20);
        assert_eq!(prompt.max_error_retry(), 3);
        assert_eq!(prompt.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(prompt.max_iteration_prompt(), DEFAULT_MAX_ITERATION_PROMPT);
        assert!(prompt.tools().is_empty());
    }

    #[test]
    fn build_rejects_invalid_requests() {
        let err = Prompt::builder("task").build().expect_err("no outputs");
        assert_eq!(err, ConfigError::NoOutputProperties);

        let err = person().max_iterations(0).build().expect_err("zero iterations");
        assert_eq!(err, ConfigError::ZeroIterations);

        let err = Prompt::builder("  ")
            .output_property(report_property())
            .build()
            .expect_err("blank prompt");
        assert_eq!(err, ConfigError::EmptyField { field: "user_prompt" });

        let err = person()
            .output_property(PropertyDefinition::string("name"))
            .build()
            .expect_err("duplicate");
        assert_eq!(
            err,
            ConfigError::DuplicateProperty {
                property: "name".into()
            }
        );

        let err = person()
            .image(Image::new("image/png", Vec::new()))
            .build()
            .expect_err("empty image");
        assert_eq!(err, ConfigError::EmptyImage { index: 0 });
    }

    #[test]
    fn zero_retries_is_allowed() {
        let prompt = person().max_error_retry(0).build().expect("build");
        assert_eq!(prompt.max_error_retry(), 0);
    }

    #[test]
    fn summary_reduces_images_to_mime() {
        let prompt = person()
            .image(Image::new("image/png", vec![1, 2, 3]))
            .tool("code", json!({"code_bases": ["."]}))
            .build()
            .expect("build");
        let summary = serde_json::to_value(prompt.summary()).expect("serialize");
        assert_eq!(summary["images"], json!(["image/png"]));
        assert_eq!(summary["tools"], json!({"code": {"code_bases": ["."]}}));
        assert_eq!(summary["output_properties"][0]["name"], json!("name"));
    }

    #[test]
    fn sub_agent_requires_report() {
        let prompt = Prompt::sub_agent("look around").build().expect("build");
        assert_eq!(prompt.output_properties(), &[report_property()]);
    }
}
