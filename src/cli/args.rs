//! CLI argument definitions using clap
//!
//! Commands:
//! - cdrflow init --config <path>
//! - cdrflow check --config <path>
//! - cdrflow run --config <path> [--drain]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cdrflow - transactional batch-file mediation pipelines
#[derive(Parser, Debug)]
#[command(name = "cdrflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the directory layout the configuration names
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./cdrflow.json")]
        config: PathBuf,
    },

    /// Validate the configuration and report resolved paths
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./cdrflow.json")]
        config: PathBuf,
    },

    /// Recover claims, then drive every configured pipeline
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./cdrflow.json")]
        config: PathBuf,

        /// Process the current backlog and exit instead of watching
        #[arg(long)]
        drain: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
