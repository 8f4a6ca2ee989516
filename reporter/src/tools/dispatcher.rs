//! Per-run tool set: schema export, argument validation, and routing.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::errors::{ConfigError, DispatchError, MalformedResponse, RunError};
use crate::core::message::ToolCall;
use crate::core::property::PropertyDefinition;
use crate::core::prompt::Prompt;
use crate::core::response::{ToolOutcome, ToolResponse};
use crate::tools::{
    DONE_TOOL, DoneTool, ResourceCache, Tool, ToolArgs, ToolContext, ToolDefinition, ToolError,
    ToolRegistry,
};

/// Active tools of one run plus the run's resource cache.
///
/// The `done` tool is always present. After [`Dispatcher::narrow_to_completion`]
/// it is the only tool the model can see or call.
pub struct Dispatcher {
    tools: Vec<Box<dyn Tool>>,
    narrowed: bool,
    cache: ResourceCache,
    model: String,
}

impl Dispatcher {
    /// Instantiate every collection named in the prompt plus `done`.
    pub fn build(registry: &ToolRegistry, prompt: &Prompt) -> Result<Self, RunError> {
        let mut tools = Vec::new();
        for (collection, config) in prompt.tools() {
            tools.extend(registry.instantiate(collection, config)?);
        }
        let dispatcher = Self::from_tools(tools, prompt.output_properties().to_vec(), prompt.model())?;
        debug!(
            tools = ?dispatcher.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "dispatcher ready"
        );
        Ok(dispatcher)
    }

    pub fn from_tools(
        mut tools: Vec<Box<dyn Tool>>,
        output_properties: Vec<PropertyDefinition>,
        model: &str,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for tool in &tools {
            let name = tool.name();
            if name == DONE_TOOL {
                return Err(ConfigError::ReservedToolName {
                    tool: name.to_string(),
                });
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::DuplicateTool {
                    tool: name.to_string(),
                });
            }
        }
        tools.push(Box::new(DoneTool::new(output_properties)));
        Ok(Self {
            tools,
            narrowed: false,
            cache: ResourceCache::new(),
            model: model.to_string(),
        })
    }

    /// Restrict the active set to the completion tool. Cached state is kept.
    pub fn narrow_to_completion(&mut self) {
        self.narrowed = true;
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Function definitions for the currently active tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.active().map(ToolDefinition::from_tool).collect()
    }

    /// Validate `args` against the tool's declared properties and execute it.
    #[instrument(skip_all, fields(tool = name))]
    pub fn call(&mut self, name: &str, args: &ToolArgs) -> Result<ToolResponse, DispatchError> {
        let narrowed = self.narrowed;
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.name() == name && (!narrowed || name == DONE_TOOL))
            .ok_or_else(|| MalformedResponse::ToolNotDefined {
                tool: name.to_string(),
            })?;

        for property in tool.properties() {
            validate_property(name, &property, args.get(property.name()))?;
        }

        let args_json = Value::Object(args.clone());
        info!(args = %args_json, "tool call");
        let mut ctx = ToolContext::new(&mut self.cache, &self.model);
        let response = tool.execute(args, &mut ctx).map_err(|err| match err {
            ToolError::Malformed(malformed) => DispatchError::Malformed(malformed),
            ToolError::Fatal(source) => DispatchError::Fatal {
                tool: name.to_string(),
                source,
            },
        })?;
        debug!(kind = response.kind(), response = ?response, "tool response");
        Ok(response)
    }

    /// Parse a raw model call, run it, and tag the result with the call id.
    pub fn dispatch(&mut self, call: &ToolCall) -> Result<ToolOutcome, DispatchError> {
        if !self.is_active(&call.name) {
            return Err(MalformedResponse::ToolNotDefined {
                tool: call.name.clone(),
            }
            .into());
        }
        let args = parse_arguments(&call.name, &call.arguments)?;
        let response = self.call(&call.name, &args)?;
        Ok(ToolOutcome {
            tool: call.name.clone(),
            call_id: call.id.clone(),
            response,
        })
    }

    fn is_active(&self, name: &str) -> bool {
        self.active().any(|tool| tool.name() == name)
    }

    fn active(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools
            .iter()
            .map(|tool| tool.as_ref())
            .filter(|tool| !self.narrowed || tool.name() == DONE_TOOL)
    }
}

/// Checks run in a fixed order: type, required, choices, range.
fn validate_property(
    tool: &str,
    property: &PropertyDefinition,
    value: Option<&Value>,
) -> Result<(), MalformedResponse> {
    let tool = tool.to_string();
    let name = property.name().to_string();
    if !property.check_type(value) {
        return Err(MalformedResponse::PropertyInvalidType {
            tool,
            property: name,
        });
    }
    if !property.check_required(value) {
        return Err(MalformedResponse::PropertyMissing {
            tool,
            property: name,
        });
    }
    if !property.check_choices(value) {
        return Err(MalformedResponse::PropertyInvalidChoice {
            tool,
            property: name,
        });
    }
    if !property.check_range(value) {
        return Err(MalformedResponse::PropertyOutOfRange {
            tool,
            property: name,
        });
    }
    Ok(())
}

fn parse_arguments(tool: &str, raw: &str) -> Result<ToolArgs, MalformedResponse> {
    if raw.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    let unparsable = |reason: String| MalformedResponse::UnparsableArguments {
        tool: tool.to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(other) => Err(unparsable(format!("expected an object, got {other}"))),
        Err(err) => Err(unparsable(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use serde_json::json;

    use super::*;
    use crate::core::property::PropertyType;

    struct Lookup;

    impl Tool for Lookup {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> String {
            "Look up a record.".to_string()
        }

        fn properties(&self) -> Vec<PropertyDefinition> {
            vec![
                PropertyDefinition::new("id", PropertyType::Integer)
                    .with_range(1.0, 100.0)
                    .required(),
                PropertyDefinition::new("kind", PropertyType::Enum).with_choices(["user", "team"]),
            ]
        }

        fn execute(&self, args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<ToolResponse, ToolError> {
            let lookups = ctx
                .cache()
                .get_or_try_insert_with("lookups", || Ok(0_u32))?;
            *lookups += 1;
            match args.get("id").and_then(Value::as_i64) {
                Some(13) => Err(anyhow!("record store unavailable").into()),
                Some(42) => Err(MalformedResponse::PropertyInvalid {
                    tool: "lookup".into(),
                    property: "id".into(),
                    why: "No such record".into(),
                }
                .into()),
                Some(id) => Ok(ToolResponse::message(format!("record {id}"))),
                None => Ok(ToolResponse::message("no id")),
            }
        }
    }

    fn lookup() -> Box<dyn Tool> {
        Box::new(Lookup)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::from_tools(
            vec![lookup()],
            vec![
                PropertyDefinition::string("name").required(),
                PropertyDefinition::new("age", PropertyType::Integer),
            ],
            "test-model",
        )
        .expect("dispatcher")
    }

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn malformed(result: Result<ToolResponse, DispatchError>) -> MalformedResponse {
        match result {
            Err(DispatchError::Malformed(err)) => err,
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn definitions_include_done_with_output_schema() {
        let dispatcher = dispatcher();
        let definitions = dispatcher.definitions();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "lookup");
        assert_eq!(definitions[0].parameters["required"], json!(["id"]));
        assert_eq!(
            definitions[1],
            ToolDefinition {
                name: "done".into(),
                description: "Finish your analysis.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": ""},
                        "age": {"type": "integer", "description": ""},
                    },
                    "required": ["name"],
                }),
            }
        );
    }

    #[test]
    fn narrowing_leaves_only_done() {
        let mut dispatcher = dispatcher();
        dispatcher.narrow_to_completion();
        let definitions = dispatcher.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, DONE_TOOL);
        let err = malformed(dispatcher.call("lookup", &args(json!({"id": 1}))));
        assert_eq!(err, MalformedResponse::ToolNotDefined { tool: "lookup".into() });
    }

    #[test]
    fn done_returns_arguments_verbatim() {
        let mut dispatcher = dispatcher();
        let supplied = args(json!({"name": "Fake Person", "age": 30}));
        let response = dispatcher.call("done", &supplied).expect("done");
        assert_eq!(response, ToolResponse::Done(supplied));
    }

    #[test]
    fn unknown_tool_ignores_argument_contents() {
        let mut dispatcher = dispatcher();
        for raw in ["{}", "not json", "[1,2]", ""] {
            let call = ToolCall {
                id: Some("call-1".into()),
                name: "missing".into(),
                arguments: raw.into(),
            };
            match dispatcher.dispatch(&call) {
                Err(DispatchError::Malformed(MalformedResponse::ToolNotDefined { tool })) => {
                    assert_eq!(tool, "missing");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn missing_required_reported_before_other_checks() {
        let mut dispatcher = dispatcher();
        let err = malformed(dispatcher.call("done", &args(json!({"age": "thirty"}))));
        assert_eq!(
            err,
            MalformedResponse::PropertyMissing {
                tool: "done".into(),
                property: "name".into()
            }
        );
    }

    #[test]
    fn checks_follow_fixed_order() {
        let mut dispatcher = dispatcher();
        let err = malformed(dispatcher.call("lookup", &args(json!({"id": "7"}))));
        assert!(matches!(err, MalformedResponse::PropertyInvalidType { .. }));

        let err = malformed(dispatcher.call("lookup", &args(json!({"id": 500}))));
        assert!(matches!(err, MalformedResponse::PropertyOutOfRange { .. }));

        let err = malformed(dispatcher.call("lookup", &args(json!({"id": 5, "kind": "org"}))));
        assert_eq!(
            err,
            MalformedResponse::PropertyInvalidChoice {
                tool: "lookup".into(),
                property: "kind".into()
            }
        );
    }

    #[test]
    fn tool_domain_errors_are_malformed_and_bugs_are_fatal() {
        let mut dispatcher = dispatcher();
        let err = malformed(dispatcher.call("lookup", &args(json!({"id": 42}))));
        assert!(matches!(err, MalformedResponse::PropertyInvalid { .. }));

        match dispatcher.call("lookup", &args(json!({"id": 13}))) {
            Err(DispatchError::Fatal { tool, source }) => {
                assert_eq!(tool, "lookup");
                assert_eq!(source.to_string(), "record store unavailable");
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn cache_persists_across_calls() {
        let mut dispatcher = dispatcher();
        for id in 1..=3 {
            dispatcher
                .call("lookup", &args(json!({"id": id})))
                .expect("call");
        }
        assert_eq!(dispatcher.cache().get::<u32>("lookups"), Some(&3));
    }

    #[test]
    fn dispatch_parses_arguments_and_tags_call_id() {
        let mut dispatcher = dispatcher();
        let outcome = dispatcher
            .dispatch(&ToolCall {
                id: Some("call-9".into()),
                name: "lookup".into(),
                arguments: r#"{"id": 9}"#.into(),
            })
            .expect("dispatch");
        assert_eq!(outcome.call_id.as_deref(), Some("call-9"));
        assert_eq!(outcome.response, ToolResponse::message("record 9"));

        let err = dispatcher
            .dispatch(&ToolCall {
                id: None,
                name: "lookup".into(),
                arguments: "[9]".into(),
            })
            .expect_err("array payload");
        assert!(matches!(
            err,
            DispatchError::Malformed(MalformedResponse::UnparsableArguments { .. })
        ));
    }

    #[test]
    fn reserved_and_duplicate_tool_names_rejected() {
        let err = Dispatcher::from_tools(vec![lookup(), lookup()], Vec::new(), "m")
            .err()
            .expect("duplicate");
        assert_eq!(err, ConfigError::DuplicateTool { tool: "lookup".into() });

        let done: Box<dyn Tool> = Box::new(DoneTool::new(Vec::new()));
        let err = Dispatcher::from_tools(vec![done], Vec::new(), "m")
            .err()
            .expect("reserved");
        assert_eq!(err, ConfigError::ReservedToolName { tool: "done".into() });
    }
}
