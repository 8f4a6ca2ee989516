//! Reporter configuration (`reporter.toml`) and the report catalog built from it.
//!
//! The file is checked against `schemas/config.schema.json` before it is
//! deserialized, so structural mistakes surface as schema violations rather
//! than serde messages. Prompts are minijinja templates rendered with the CLI
//! input and the values of every report that already ran.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;
use jsonschema::validator_for;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agent::DEFAULT_MAX_DEPTH;
use crate::core::image::Image;
use crate::core::property::PropertyDefinition;
use crate::core::prompt::{DEFAULT_MAX_ERROR_RETRY, DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, Prompt};
use crate::io::model::{ModelClient, NullClient};
use crate::io::openai::{OpenAiClient, OpenAiSettings};
use crate::report::{ReportType, ReportValues};
use crate::tools::ToolRegistry;

pub const DEFAULT_CONFIG_PATH: &str = "reporter.toml";
pub const CONFIG_SCHEMA: &str = include_str!("../../schemas/config.schema.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReporterConfig {
    pub client: ClientConfig,
    pub defaults: Defaults,
    pub reports: IndexMap<String, ReportConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    OpenAi,
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub kind: ClientKind,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kind: ClientKind::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: 0.2,
            top_p: 0.1,
        }
    }
}

impl ClientConfig {
    /// Build the configured model client.
    pub fn build(&self) -> Result<Box<dyn ModelClient>> {
        match self.kind {
            ClientKind::Null => Ok(Box::new(NullClient)),
            ClientKind::OpenAi => {
                let api_key = std::env::var(&self.api_key_env)
                    .with_context(|| format!("read API key from ${}", self.api_key_env))?;
                let client = OpenAiClient::new(OpenAiSettings {
                    base_url: self.base_url.clone(),
                    api_key,
                    timeout: Duration::from_secs(self.timeout_secs),
                    temperature: self.temperature,
                    top_p: self.top_p,
                })?;
                Ok(Box::new(client))
            }
        }
    }
}

/// Values applied to every report that does not override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Defaults {
    pub model: String,
    pub max_iterations: u32,
    pub max_error_retry: u32,
    /// Sub-agent nesting limit.
    pub max_depth: usize,
    /// Upper bound on reports run by one chain.
    pub max_reports: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_error_retry: DEFAULT_MAX_ERROR_RETRY,
            max_depth: DEFAULT_MAX_DEPTH,
            max_reports: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    /// Template; receives `input` and `reports`.
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iteration_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_error_retry: Option<u32>,
    pub properties: Vec<PropertyDefinition>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tools: IndexMap<String, Value>,
    /// Evaluated in order; the first matching rule picks the next report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<NextRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextRule {
    pub report: String,
    /// minijinja expression; absent means "always".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            defaults: Defaults::default(),
            reports: IndexMap::new(),
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client.timeout_secs == 0 {
            return Err(anyhow!("client.timeout_secs must be > 0"));
        }
        if self.defaults.model.trim().is_empty() {
            return Err(anyhow!("defaults.model must be non-empty"));
        }
        if self.defaults.max_iterations == 0 {
            return Err(anyhow!("defaults.max_iterations must be > 0"));
        }
        if self.defaults.max_reports == 0 {
            return Err(anyhow!("defaults.max_reports must be > 0"));
        }
        for (name, report) in &self.reports {
            report
                .validate(self)
                .with_context(|| format!("report '{name}'"))?;
        }
        Ok(())
    }

    /// Every tool collection a report enables must exist in `registry`.
    pub fn check_tool_collections(&self, registry: &ToolRegistry) -> Result<()> {
        for (name, report) in &self.reports {
            for collection in report.tools.keys() {
                if !registry.contains(collection) {
                    bail!("report '{name}' enables unknown tool collection '{collection}'");
                }
            }
        }
        Ok(())
    }
}

impl ReportConfig {
    fn validate(&self, config: &ReporterConfig) -> Result<()> {
        if self.user_prompt.trim().is_empty() {
            bail!("user_prompt must be non-empty");
        }
        if self.properties.is_empty() {
            bail!("properties must contain at least one property");
        }
        let mut seen = Vec::new();
        for property in &self.properties {
            property.validate()?;
            if seen.contains(&property.name()) {
                bail!("duplicate property '{}'", property.name());
            }
            seen.push(property.name());
        }
        if self.max_iterations == Some(0) {
            bail!("max_iterations must be > 0");
        }
        for rule in &self.next {
            if !config.reports.contains_key(&rule.report) {
                bail!("next report '{}' is not defined", rule.report);
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReporterConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReporterConfig> {
    if !path.exists() {
        let cfg = ReporterConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("load {}", path.display()))
}

/// Parse, schema-check, and validate TOML config text.
pub fn parse_config(contents: &str) -> Result<ReporterConfig> {
    let raw: Value = toml::from_str(contents).context("parse config toml")?;
    validate_schema(&raw)?;
    let cfg: ReporterConfig = serde_json::from_value(raw).context("decode config")?;
    cfg.validate()?;
    Ok(cfg)
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(CONFIG_SCHEMA).context("parse config schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "config schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ReporterConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Text and images supplied for a chain run; visible to every report.
#[derive(Debug, Clone, Default)]
pub struct ChainInput {
    pub text: String,
    pub images: Vec<Image>,
}

/// Builds [`ReportType`]s from config, wiring `next` rules into them.
#[derive(Clone)]
pub struct ReportCatalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    config: ReporterConfig,
    input: ChainInput,
}

impl ReportCatalog {
    /// Fails if any prompt template or `when` expression does not compile.
    pub fn new(config: ReporterConfig, input: ChainInput) -> Result<Self> {
        check_templates(&config)?;
        Ok(Self {
            inner: Arc::new(CatalogInner { config, input }),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.config.reports.keys().map(String::as_str)
    }

    /// Render report `name` against the values of reports that already ran.
    pub fn report_type(&self, name: &str, prior: &ReportValues) -> Result<ReportType> {
        let inner = &self.inner;
        let report = inner
            .config
            .reports
            .get(name)
            .with_context(|| format!("unknown report '{name}'"))?;
        let defaults = &inner.config.defaults;
        let ctx = context! { input => inner.input.text.as_str(), reports => prior };

        let env = Environment::new();
        let user_prompt = env
            .render_str(&report.user_prompt, &ctx)
            .with_context(|| format!("render user_prompt of report '{name}'"))?;
        let mut builder = Prompt::builder(user_prompt)
            .output_properties(report.properties.iter().cloned())
            .model(report.model.as_deref().unwrap_or(&defaults.model))
            .max_iterations(report.max_iterations.unwrap_or(defaults.max_iterations))
            .max_error_retry(report.max_error_retry.unwrap_or(defaults.max_error_retry))
            .tools(report.tools.clone())
            .images(inner.input.images.iter().cloned());
        if let Some(system_prompt) = &report.system_prompt {
            let rendered = env
                .render_str(system_prompt, &ctx)
                .with_context(|| format!("render system_prompt of report '{name}'"))?;
            builder = builder.system_prompt(rendered);
        }
        if let Some(max_iteration_prompt) = &report.max_iteration_prompt {
            builder = builder.max_iteration_prompt(max_iteration_prompt.clone());
        }
        let prompt = builder
            .build()
            .with_context(|| format!("build prompt of report '{name}'"))?;

        let mut report_type = ReportType::new(name, prompt);
        if !report.next.is_empty() {
            let catalog = self.clone();
            let from = name.to_string();
            report_type = report_type.with_next(move |values| catalog.select_next(&from, values));
        }
        Ok(report_type)
    }

    fn select_next(&self, from: &str, values: &ReportValues) -> Result<Option<ReportType>> {
        let inner = &self.inner;
        let report = inner
            .config
            .reports
            .get(from)
            .with_context(|| format!("unknown report '{from}'"))?;
        let ctx = context! { input => inner.input.text.as_str(), reports => values };
        let env = Environment::new();
        for rule in &report.next {
            let selected = match &rule.when {
                None => true,
                Some(when) => env
                    .compile_expression(when)
                    .and_then(|expr| expr.eval(&ctx))
                    .with_context(|| format!("evaluate next condition '{when}'"))?
                    .is_true(),
            };
            if selected {
                debug!(from, to = rule.report.as_str(), "next report selected");
                return self.report_type(&rule.report, values).map(Some);
            }
        }
        Ok(None)
    }
}

/// Compile every prompt template and `next` condition without rendering.
fn check_templates(config: &ReporterConfig) -> Result<()> {
    let env = Environment::new();
    for (name, report) in &config.reports {
        env.template_from_str(&report.user_prompt)
            .with_context(|| format!("report '{name}': user_prompt template"))?;
        if let Some(system_prompt) = &report.system_prompt {
            env.template_from_str(system_prompt)
                .with_context(|| format!("report '{name}': system_prompt template"))?;
        }
        for rule in &report.next {
            if let Some(when) = &rule.when {
                env.compile_expression(when)
                    .with_context(|| format!("report '{name}': next condition '{when}'"))?;
            }
        }
    }
    Ok(())
}
