//! Report chaining: run a report type, then let its output pick the next one.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::core::prompt::Prompt;
use crate::core::response::Values;
use crate::core::results::{BotResults, TokenUsage};
use crate::io::model::ModelClient;

/// Values of every completed report so far, keyed by report name.
pub type ReportValues = IndexMap<String, Values>;

/// Picks the report to run after this one, given all prior values.
pub type NextReport = Arc<dyn Fn(&ReportValues) -> Result<Option<ReportType>> + Send + Sync>;

/// A named prompt plus an optional rule for what follows it.
#[derive(Clone)]
pub struct ReportType {
    name: String,
    prompt: Prompt,
    next: Option<NextReport>,
}

impl ReportType {
    pub fn new(name: impl Into<String>, prompt: Prompt) -> Self {
        Self {
            name: name.into(),
            prompt,
            next: None,
        }
    }

    pub fn with_next<F>(mut self, next: F) -> Self
    where
        F: Fn(&ReportValues) -> Result<Option<ReportType>> + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(next));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn next(&self, values: &ReportValues) -> Result<Option<ReportType>> {
        match &self.next {
            Some(next) => next(values),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportType")
            .field("name", &self.name)
            .field("prompt", &self.prompt)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}

/// A completed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub report_type: String,
    pub results: BotResults,
}

/// Why the chain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStop {
    /// The last report had no successor.
    Complete,
    /// `max_reports` reports ran and another was still requested.
    LimitReached,
}

#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub reports: Vec<Report>,
    pub stop: ChainStop,
}

impl ChainOutcome {
    pub fn values(&self) -> ReportValues {
        reports_to_values(&self.reports)
    }

    pub fn tokens(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for report in &self.reports {
            total += report.results.tokens;
        }
        total
    }
}

/// Later reports with the same name replace earlier ones.
pub fn reports_to_values(reports: &[Report]) -> ReportValues {
    reports
        .iter()
        .map(|report| (report.report_type.clone(), report.results.values.clone()))
        .collect()
}

/// Run `first`, then each successor its `next` rule selects.
///
/// Stops after `max_reports` runs even if another report was requested.
pub fn run_chain<C: ModelClient>(
    agent: &Agent<C>,
    first: ReportType,
    max_reports: usize,
) -> Result<ChainOutcome> {
    let mut reports: Vec<Report> = Vec::new();
    let mut current = Some(first);
    while let Some(report_type) = current.take() {
        if reports.len() >= max_reports {
            warn!(max_reports, next = report_type.name(), "report chain limit reached");
            return Ok(ChainOutcome {
                reports,
                stop: ChainStop::LimitReached,
            });
        }
        info!(report = report_type.name(), "running report");
        let results = agent
            .run(report_type.prompt())
            .with_context(|| format!("run report '{}'", report_type.name()))?;
        reports.push(Report {
            report_type: report_type.name().to_string(),
            results,
        });
        current = report_type
            .next(&reports_to_values(&reports))
            .with_context(|| format!("select report after '{}'", report_type.name()))?;
    }
    Ok(ChainOutcome {
        reports,
        stop: ChainStop::Complete,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::prompt::report_property;
    use crate::test_support::{ScriptedClient, call, turn};
    use crate::tools::ToolRegistry;

    fn prompt(task: &str) -> Prompt {
        Prompt::builder(task)
            .output_property(report_property())
            .build()
            .expect("prompt")
    }

    #[test]
    fn next_sees_all_prior_values() {
        let client = ScriptedClient::new(vec![
            turn(vec![call("done", json!({"report": "first"}))]),
            turn(vec![call("done", json!({"report": "second"}))]),
        ]);
        let agent = Agent::new(&client, ToolRegistry::new());
        let first = ReportType::new("one", prompt("first task")).with_next(|values| {
            assert_eq!(values["one"]["report"], json!("first"));
            Ok(Some(ReportType::new("two", prompt("second task"))))
        });

        let outcome = run_chain(&agent, first, 5).expect("chain");
        assert_eq!(outcome.stop, ChainStop::Complete);
        let names: Vec<&str> = outcome.reports.iter().map(|r| r.report_type.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
        assert_eq!(outcome.values()["two"]["report"], json!("second"));
        assert_eq!(outcome.tokens(), TokenUsage::new(20, 2));
        client.assert_drained();
    }

    #[test]
    fn chain_stops_at_limit() {
        fn looping() -> ReportType {
            ReportType::new("again", prompt("repeat")).with_next(|_| Ok(Some(looping())))
        }
        let client = ScriptedClient::new(vec![
            turn(vec![call("done", json!({"report": "1"}))]),
            turn(vec![call("done", json!({"report": "2"}))]),
        ]);
        let agent = Agent::new(&client, ToolRegistry::new());
        let outcome = run_chain(&agent, looping(), 2).expect("chain");
        assert_eq!(outcome.stop, ChainStop::LimitReached);
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.values().len(), 1);
        client.assert_drained();
    }

    #[test]
    fn run_failure_names_report() {
        let client = ScriptedClient::new(Vec::new());
        let agent = Agent::new(&client, ToolRegistry::new());
        let err = run_chain(&agent, ReportType::new("broken", prompt("task")), 1)
            .expect_err("no responses");
        assert!(format!("{err:#}").contains("run report 'broken'"));
    }
}
