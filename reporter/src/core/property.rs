//! Declared tool parameters and output values.
//!
//! A [`PropertyDefinition`] renders the model-facing JSON Schema fragment for
//! one named value and validates candidate values the model sends back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::errors::ConfigError;

/// Runtime shape of a property value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Enum,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Object => "object",
            PropertyType::Array => "array",
            PropertyType::Enum => "enum",
        }
    }

    fn accepts_choices(self) -> bool {
        matches!(self, PropertyType::Enum | PropertyType::Array)
    }

    fn is_numeric(self) -> bool {
        matches!(self, PropertyType::Integer | PropertyType::Number)
    }
}

/// One named value a tool accepts or the `done` tool must supply.
///
/// `min`/`max` of zero mean "unbounded" on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    name: String,
    #[serde(rename = "type", default)]
    kind: PropertyType,
    #[serde(default)]
    description: String,
    #[serde(default)]
    min: f64,
    #[serde(default)]
    max: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    choices: Vec<String>,
    #[serde(default)]
    required: bool,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            min: 0.0,
            max: 0.0,
            choices: Vec::new(),
            required: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyType {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Reject definitions that could never be satisfied or rendered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyPropertyName);
        }
        if !self.choices.is_empty() && !self.kind.accepts_choices() {
            return Err(ConfigError::ChoicesNotAllowed {
                property: self.name.clone(),
                kind: self.kind.as_str(),
            });
        }
        if self.kind == PropertyType::Enum && self.choices.is_empty() {
            return Err(ConfigError::MissingChoices {
                property: self.name.clone(),
            });
        }
        if self.min != 0.0 && self.max != 0.0 && self.min > self.max {
            return Err(ConfigError::InvalidRange {
                property: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Render the JSON Schema fragment exposed to the model.
    pub fn to_descriptor(&self) -> Value {
        let mut descriptor = Map::new();
        let rendered_type = match self.kind {
            PropertyType::Enum => PropertyType::String,
            other => other,
        };
        descriptor.insert("type".into(), json!(rendered_type.as_str()));
        descriptor.insert("description".into(), json!(self.description));
        match self.kind {
            PropertyType::Integer | PropertyType::Number => {
                if self.min != 0.0 {
                    descriptor.insert("minimum".into(), number(self.kind, self.min));
                }
                if self.max != 0.0 {
                    descriptor.insert("maximum".into(), number(self.kind, self.max));
                }
            }
            PropertyType::Array => {
                descriptor.insert("items".into(), json!({ "type": "string" }));
            }
            PropertyType::Enum => {
                descriptor.insert("enum".into(), json!(self.choices));
            }
            _ => {}
        }
        Value::Object(descriptor)
    }

    /// Absent values pass; presence is [`Self::check_required`]'s concern.
    pub fn check_type(&self, value: Option<&Value>) -> bool {
        let Some(value) = present(value) else {
            return true;
        };
        match self.kind {
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Number => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
            PropertyType::Array => value.is_array(),
            PropertyType::Enum => match value {
                Value::String(_) => true,
                Value::Array(items) => items.iter().all(Value::is_string),
                _ => false,
            },
        }
    }

    pub fn check_required(&self, value: Option<&Value>) -> bool {
        !self.required || present(value).is_some()
    }

    pub fn check_range(&self, value: Option<&Value>) -> bool {
        if !self.kind.is_numeric() {
            return true;
        }
        let Some(number) = present(value).and_then(Value::as_f64) else {
            return true;
        };
        if self.min != 0.0 && number < self.min {
            return false;
        }
        if self.max != 0.0 && number > self.max {
            return false;
        }
        true
    }

    pub fn check_choices(&self, value: Option<&Value>) -> bool {
        if self.choices.is_empty() {
            return true;
        }
        let is_choice = |candidate: &Value| {
            candidate
                .as_str()
                .is_some_and(|s| self.choices.iter().any(|choice| choice == s))
        };
        match present(value) {
            None => true,
            Some(Value::Array(items)) => items.iter().all(is_choice),
            Some(other) => is_choice(other),
        }
    }
}

/// JSON `null` counts as absent.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn number(kind: PropertyType, bound: f64) -> Value {
    if kind == PropertyType::Integer && bound.fract() == 0.0 {
        json!(bound as i64)
    } else {
        json!(bound)
    }
}
