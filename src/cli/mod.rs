//! CLI module for cdrflow
//!
//! Provides the command-line interface:
//! - init: create the configured directory layout
//! - check: validate configuration and report resolved paths
//! - run: recover claims and drive the configured pipelines

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{check, init, run, run_command, run_pipelines};
pub use errors::{CliError, CliResult};
