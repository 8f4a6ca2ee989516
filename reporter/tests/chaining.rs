//! Config-driven report chains.
//!
//! Reports are parsed from TOML, rendered through the catalog, and run with
//! `run_chain`; `next` conditions decide whether the follow-up report runs.

use serde_json::json;

use reporter::agent::Agent;
use reporter::core::message::Message;
use reporter::io::config::{ChainInput, ReportCatalog, parse_config};
use reporter::io::model::NullClient;
use reporter::report::{ChainStop, ReportValues, run_chain};
use reporter::test_support::{ScriptedClient, call, turn};
use reporter::tools::ToolRegistry;

const CHAIN: &str = r#"
[client]
kind = "null"

[defaults]
model = "chain-model"
max_iterations = 4
max_reports = 3

[reports.triage]
user_prompt = "Triage this bug: {{ input }}"
[[reports.triage.properties]]
name = "severity"
type = "enum"
choices = ["low", "high"]
required = true
[[reports.triage.next]]
report = "deep_dive"
when = "reports.triage.severity == 'high'"

[reports.deep_dive]
user_prompt = "Investigate the {{ reports.triage.severity }} severity bug: {{ input }}"
system_prompt = "You are a careful investigator."
[[reports.deep_dive.properties]]
name = "report"
required = true
[[reports.deep_dive.next]]
report = "triage"
when = "false"
"#;

fn catalog(input: &str) -> ReportCatalog {
    let config = parse_config(CHAIN).expect("parse");
    config
        .check_tool_collections(&ToolRegistry::with_defaults())
        .expect("collections");
    ReportCatalog::new(
        config,
        ChainInput {
            text: input.to_string(),
            images: Vec::new(),
        },
    )
    .expect("catalog")
}

/// A matching `when` condition runs the follow-up report with the prior
/// report's values rendered into its prompt.
#[test]
fn matching_condition_runs_follow_up() {
    let catalog = catalog("login page crashes");
    let client = ScriptedClient::new(vec![
        turn(vec![call("done", json!({"severity": "high"}))]),
        turn(vec![call("done", json!({"report": "null session token"}))]),
    ]);
    let agent = Agent::new(&client, ToolRegistry::with_defaults());
    let first = catalog
        .report_type("triage", &ReportValues::new())
        .expect("triage");

    let outcome = run_chain(&agent, first, 3).expect("chain");

    assert_eq!(outcome.stop, ChainStop::Complete);
    let names: Vec<&str> = outcome
        .reports
        .iter()
        .map(|report| report.report_type.as_str())
        .collect();
    assert_eq!(names, vec!["triage", "deep_dive"]);
    assert_eq!(
        outcome.values()["deep_dive"]["report"],
        json!("null session token")
    );

    let requests = client.requests();
    assert_eq!(requests[0].model, "chain-model");
    assert_eq!(
        requests[0].messages[1],
        Message::User("Triage this bug: login page crashes".to_string())
    );
    assert_eq!(
        requests[1].messages[0],
        Message::System("You are a careful investigator.".to_string())
    );
    assert_eq!(
        requests[1].messages[1],
        Message::User("Investigate the high severity bug: login page crashes".to_string())
    );
    client.assert_drained();
}

/// A failing condition ends the chain after the first report.
#[test]
fn unmatched_condition_completes_chain() {
    let catalog = catalog("typo in footer");
    let client = ScriptedClient::new(vec![turn(vec![call(
        "done",
        json!({"severity": "low"}),
    )])]);
    let agent = Agent::new(&client, ToolRegistry::with_defaults());
    let first = catalog
        .report_type("triage", &ReportValues::new())
        .expect("triage");

    let outcome = run_chain(&agent, first, 3).expect("chain");

    assert_eq!(outcome.stop, ChainStop::Complete);
    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.tokens().total(), 11);
    client.assert_drained();
}

/// The null client picks the first enum choice, so triage stays low.
#[test]
fn null_client_runs_offline() {
    let catalog = catalog("anything");
    let agent = Agent::new(NullClient, ToolRegistry::with_defaults());
    let first = catalog
        .report_type("triage", &ReportValues::new())
        .expect("triage");

    let outcome = run_chain(&agent, first, 3).expect("chain");

    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.values()["triage"]["severity"], json!("low"));
}

/// Chains stop at the report limit even when another report was selected.
#[test]
fn report_limit_stops_chain() {
    let catalog = catalog("login page crashes");
    let client = ScriptedClient::new(vec![turn(vec![call(
        "done",
        json!({"severity": "high"}),
    )])]);
    let agent = Agent::new(&client, ToolRegistry::with_defaults());
    let first = catalog
        .report_type("triage", &ReportValues::new())
        .expect("triage");

    let outcome = run_chain(&agent, first, 1).expect("chain");

    assert_eq!(outcome.stop, ChainStop::LimitReached);
    assert_eq!(outcome.reports.len(), 1);
    client.assert_drained();
}

/// Unknown report names are reported by name.
#[test]
fn unknown_report_is_an_error() {
    let catalog = catalog("");
    let err = catalog
        .report_type("postmortem", &ReportValues::new())
        .expect_err("unknown");
    assert!(format!("{err:#}").contains("unknown report 'postmortem'"));
}
