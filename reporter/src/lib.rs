//! Agentic tool-use report runner.
//!
//! A run hands a task and a set of tools to a language model and keeps asking
//! it to call tools until it calls `done` with the requested output values.
//! Completed runs (reports) can be chained, each report's output choosing the
//! next one.
//!
//! - **[`core`]**: Pure data and validation (properties, prompts, responses,
//!   error kinds). No I/O.
//! - **[`tools`]**: The tool contract, registry, per-run dispatcher, and the
//!   built-in code base tools.
//! - **[`io`]**: Side-effecting collaborators (model transports, config).
//!
//! Orchestration modules ([`agent`], [`report`]) tie these together.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
