//! Error kinds raised by runs, dispatch, and prompt construction.
//!
//! [`MalformedResponse`] is the only retryable family: the run loop converts
//! it into a corrective user message. Everything else aborts the run.

use thiserror::Error;

/// Fallback wording when the model's reply could not be interpreted at all.
pub const GENERIC_RETRY_MESSAGE: &str =
    "I'm sorry, I couldn't understand your response, or something was missing. Please try again.";

/// A tool call that does not match the declared tool contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedResponse {
    #[error("tool '{tool}' is not defined")]
    ToolNotDefined { tool: String },

    #[error("tool '{tool}' is missing required property '{property}'")]
    PropertyMissing { tool: String, property: String },

    #[error("tool '{tool}' received property '{property}' with an unexpected type")]
    PropertyInvalidType { tool: String, property: String },

    #[error("tool '{tool}' received property '{property}' outside the declared choices")]
    PropertyInvalidChoice { tool: String, property: String },

    #[error("tool '{tool}' received property '{property}' outside the declared range")]
    PropertyOutOfRange { tool: String, property: String },

    /// Raised by tool code for domain failures (e.g. an unknown resource id).
    #[error("tool '{tool}' rejected property '{property}': {why}")]
    PropertyInvalid {
        tool: String,
        property: String,
        why: String,
    },

    #[error("tool '{tool}' arguments are not a JSON object: {reason}")]
    UnparsableArguments { tool: String, reason: String },
}

impl MalformedResponse {
    /// Corrective text appended to the conversation before the model retries.
    pub fn retry_message(&self) -> String {
        match self {
            MalformedResponse::ToolNotDefined { tool } => {
                format!("You tried to call a non-existent tool, '{tool}'. Please try again.")
            }
            MalformedResponse::PropertyMissing { tool, property } => format!(
                "A required property, '{property}', was missing in your call to the '{tool}' tool. Please try again."
            ),
            MalformedResponse::PropertyInvalidType { tool, property } => {
                invalid_property(tool, property, "Unexpected value type.")
            }
            MalformedResponse::PropertyInvalidChoice { tool, property } => {
                invalid_property(tool, property, "Value is not one of the provided options.")
            }
            MalformedResponse::PropertyOutOfRange { tool, property } => {
                invalid_property(tool, property, "Value is out of range.")
            }
            MalformedResponse::PropertyInvalid {
                tool,
                property,
                why,
            } => invalid_property(tool, property, why),
            MalformedResponse::UnparsableArguments { .. } => GENERIC_RETRY_MESSAGE.to_string(),
        }
    }
}

fn invalid_property(tool: &str, property: &str, why: &str) -> String {
    let why = why.trim();
    let why = if why.is_empty() {
        String::new()
    } else if why.ends_with('.') {
        format!("{why} ")
    } else {
        format!("{why}. ")
    };
    format!("Property '{property}' was invalid in your call to the '{tool}' tool. {why}Please try again.")
}

/// Failure of a single dispatched tool call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error("tool '{tool}' failed")]
    Fatal {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Invalid prompt, property, or tool set. Raised before any model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be non-empty")]
    EmptyField { field: &'static str },

    #[error("output_properties must contain at least one property")]
    NoOutputProperties,

    #[error("property name must be non-empty")]
    EmptyPropertyName,

    #[error("duplicate property '{property}'")]
    DuplicateProperty { property: String },

    #[error("property '{property}' of type {kind} cannot declare choices")]
    ChoicesNotAllowed {
        property: String,
        kind: &'static str,
    },

    #[error("enum property '{property}' must declare choices")]
    MissingChoices { property: String },

    #[error("property '{property}' has min greater than max")]
    InvalidRange { property: String },

    #[error("max_iterations must be >= 1")]
    ZeroIterations,

    #[error("image {index} has no data")]
    EmptyImage { index: usize },

    #[error("unknown tool collection '{collection}'")]
    UnknownToolCollection { collection: String },

    #[error("tool collection '{collection}' is registered twice")]
    DuplicateCollection { collection: String },

    #[error("tool '{tool}' is defined more than once")]
    DuplicateTool { tool: String },

    #[error("tool name '{tool}' is reserved")]
    ReservedToolName { tool: String },
}

/// Fatal outcome of a run. No partial results accompany these.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("model kept sending malformed responses in iteration {iteration}")]
    RetriesExhausted {
        iteration: u32,
        #[source]
        source: MalformedResponse,
    },

    #[error("max iterations reached ({max_iterations}) without a done call")]
    MaxIterations { max_iterations: u32 },

    #[error("sub-agent depth limit of {max_depth} exceeded")]
    MaxDepth { max_depth: usize },

    #[error("tool '{tool}' failed")]
    Tool {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("tool collection '{collection}' could not be configured")]
    ToolConfig {
        collection: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("model request failed")]
    Model(#[source] anyhow::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
