//! CLI errors
//!
//! Thin layer over the module errors the commands surface; every CLI error
//! ends the process with a non-zero exit.

use thiserror::Error;

use crate::config::ConfigError;
use crate::input::InputError;
use crate::pool::PoolError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Building an input adapter failed, usually during claim recovery.
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("failed to create directory {path}: {reason}")]
    InitFailed { path: String, reason: String },

    #[error("could not schedule pipeline '{pipeline}': {source}")]
    Schedule {
        pipeline: String,
        source: PoolError,
    },

    #[error("pipeline '{pipeline}' failed: {reason}")]
    PipelineFailed { pipeline: String, reason: String },
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
