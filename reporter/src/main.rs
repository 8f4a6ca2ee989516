//! Agentic tool-use report runner.
//!
//! Reads report definitions from `reporter.toml`, runs the requested report
//! (and whatever reports its `next` rules select), and prints the results as
//! JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;

use reporter::agent::Agent;
use reporter::core::image::Image;
use reporter::core::prompt::report_property;
use reporter::core::results::TokenUsage;
use reporter::exit_codes;
use reporter::io::config::{
    ChainInput, ClientKind, DEFAULT_CONFIG_PATH, ReportCatalog, ReportConfig,
    ReporterConfig, load_config, write_config,
};
use reporter::report::{ChainStop, Report, ReportValues, run_chain};
use reporter::tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "reporter", version, about = "Agentic tool-use report runner")]
struct Cli {
    /// Path to the reporter config.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Check config against schema, templates, and registered tools.
    Validate,
    /// Print the names of configured reports.
    List,
    /// Run a report and every report its `next` rules select.
    Run {
        /// Name of the first report.
        report: String,
        /// Input text, available to templates as `{{ input }}`.
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Read input text from a file.
        #[arg(long)]
        input_file: Option<PathBuf>,
        /// Image attached to every report (png, jpeg, gif, webp).
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Override the configured model client.
        #[arg(long, value_enum)]
        client: Option<ClientArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClientArg {
    Openai,
    Null,
}

impl From<ClientArg> for ClientKind {
    fn from(arg: ClientArg) -> Self {
        match arg {
            ClientArg::Openai => ClientKind::OpenAi,
            ClientArg::Null => ClientKind::Null,
        }
    }
}

fn main() {
    reporter::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::List => cmd_list(&cli.config),
        Command::Run {
            report,
            input,
            input_file,
            images,
            client,
        } => {
            let text = match (input, input_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("read input {}", path.display()))?,
                (None, None) => String::new(),
            };
            let images = images
                .iter()
                .map(|path| read_image(path))
                .collect::<Result<Vec<_>>>()?;
            cmd_run(&cli.config, &report, ChainInput { text, images }, client)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &starter_config())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let (config, _) = load_checked(path)?;
    ReportCatalog::new(config, ChainInput::default())?;
    Ok(exit_codes::OK)
}

fn cmd_list(path: &Path) -> Result<i32> {
    let (config, _) = load_checked(path)?;
    let catalog = ReportCatalog::new(config, ChainInput::default())?;
    for name in catalog.names() {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct RunOutput<'a> {
    stop: &'static str,
    tokens: TokenUsage,
    reports: &'a [Report],
}

fn cmd_run(path: &Path, report: &str, input: ChainInput, client: Option<ClientArg>) -> Result<i32> {
    let (mut config, registry) = load_checked(path)?;
    if let Some(kind) = client {
        config.client.kind = kind.into();
    }
    let max_depth = config.defaults.max_depth;
    let max_reports = config.defaults.max_reports;
    let model = config.client.build()?;
    let catalog = ReportCatalog::new(config, input)?;
    let first = catalog.report_type(report, &ReportValues::new())?;
    let agent = Agent::new(model, registry).with_max_depth(max_depth);

    let outcome = match run_chain(&agent, first, max_reports) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{:#}", err);
            return Ok(exit_codes::FAILED);
        }
    };
    let (stop, code) = match outcome.stop {
        ChainStop::Complete => ("complete", exit_codes::OK),
        ChainStop::LimitReached => ("limit_reached", exit_codes::LIMIT),
    };
    let output = RunOutput {
        stop,
        tokens: outcome.tokens(),
        reports: &outcome.reports,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("serialize reports")?
    );
    Ok(code)
}

fn load_checked(path: &Path) -> Result<(ReporterConfig, ToolRegistry)> {
    if !path.exists() {
        bail!("config {} not found (run `reporter init`)", path.display());
    }
    let config = load_config(path)?;
    let registry = ToolRegistry::with_defaults();
    config.check_tool_collections(&registry)?;
    Ok((config, registry))
}

fn read_image(path: &Path) -> Result<Image> {
    let mime = Image::mime_for_path(path)
        .with_context(|| format!("unsupported image type {}", path.display()))?;
    let data = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    Ok(Image::new(mime, data))
}

fn starter_config() -> ReporterConfig {
    let mut tools = IndexMap::new();
    tools.insert("code".to_string(), json!({ "code_bases": ["."] }));
    let mut config = ReporterConfig::default();
    config.reports.insert(
        "summary".to_string(),
        ReportConfig {
            user_prompt: "Summarize how this code base handles the following: {{ input }}".to_string(),
            system_prompt: None,
            max_iteration_prompt: None,
            model: None,
            max_iterations: None,
            max_error_retry: None,
            properties: vec![report_property()],
            tools,
            next: Vec::new(),
        },
    );
    config
}
