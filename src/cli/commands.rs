//! CLI command implementations
//!
//! `init` creates the watch directories a configuration names, `check`
//! validates without touching anything, and `run` builds one pipeline per
//! configured section and drives them on the worker pool. Commands print
//! one JSON object per result line; lifecycle detail goes through the
//! structured log like everywhere else.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use serde_json::json;

use crate::config::{Config, PipelineConfig};
use crate::input::{passthrough_transform, TlvRecordParser, TransactionalInputAdapter};
use crate::output::{single_line_expansion, TransactionalOutputAdapter};
use crate::pipeline::{Pipeline, StageChain};
use crate::pool::WorkerPool;
use crate::txn::TransactionManager;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point; the only function `main` calls.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Dispatch a parsed command.
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Check { config } => check(&config),
        Command::Run { config, drain } => run_pipelines(&config, drain),
    }
}

/// Create every directory the configuration names. Idempotent, so adding
/// a pipeline section and re-running `init` fills in the new layout.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;

    let mut directories = BTreeSet::new();
    for pipeline in config.pipelines.values() {
        for dir in pipeline.directories() {
            fs::create_dir_all(&dir).map_err(|e| CliError::InitFailed {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            directories.insert(dir.display().to_string());
        }
    }
    config.validate_directories()?;

    println!(
        "{}",
        json!({ "initialized": true, "directories": directories })
    );
    Ok(())
}

/// Validate the configuration, including directory existence, and report
/// the resolved layout per pipeline.
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    config.validate_directories()?;

    let mut pipelines = serde_json::Map::new();
    for (name, pipeline) in &config.pipelines {
        pipelines.insert(
            name.clone(),
            json!({
                "input": pipeline.input_file_path,
                "scan": format!(
                    "{}*{}",
                    pipeline.input_file_prefix, pipeline.input_file_suffix
                ),
                "processing_marker": pipeline.processing_prefix,
                "done": pipeline.done_file_path,
                "error": pipeline.err_file_path,
                "output": pipeline.output_file_path,
                "single_writer": pipeline.single_writer(),
            }),
        );
    }

    println!(
        "{}",
        json!({
            "valid": true,
            "batch_size": config.batch_size,
            "max_open_transactions": config.max_open_transactions,
            "poll_interval_ms": config.poll_interval_ms,
            "pipelines": pipelines,
        })
    );
    Ok(())
}

/// Build one pipeline per configured section and drive them on the pool.
///
/// With `drain` each pipeline processes the backlog it finds and returns
/// at the first quiescent moment. Without it the pipelines poll forever
/// and this call blocks until the process is killed; claim recovery at
/// the next start heals whatever was in flight.
pub fn run_pipelines(config_path: &Path, drain: bool) -> CliResult<()> {
    let config = Config::load(config_path)?;
    config.validate_directories()?;

    let stop = Arc::new(AtomicBool::new(false));
    let pool = WorkerPool::new(config.pipelines.len());
    let (done_tx, done_rx) = mpsc::channel();
    let count = config.pipelines.len();

    for (name, pipeline_config) in &config.pipelines {
        let mut pipeline = build_pipeline(name, pipeline_config, &config)?;
        let done_tx = done_tx.clone();
        let stop = Arc::clone(&stop);
        let pipeline_name = name.clone();
        pool.execute(move || {
            let outcome = match pipeline.run(&stop, drain) {
                Ok(()) => Ok(pipeline.records_loaded()),
                Err(e) => Err(e.to_string()),
            };
            let _ = done_tx.send((pipeline_name, outcome));
        })
        .map_err(|e| CliError::Schedule {
            pipeline: name.clone(),
            source: e,
        })?;
    }
    drop(done_tx);

    let mut first_failure = None;
    for (name, outcome) in done_rx.iter().take(count) {
        match outcome {
            Ok(records) => println!(
                "{}",
                json!({ "pipeline": name, "outcome": "drained", "records": records })
            ),
            Err(reason) => {
                println!(
                    "{}",
                    json!({ "pipeline": name, "outcome": "failed", "reason": reason })
                );
                if first_failure.is_none() {
                    first_failure = Some((name, reason));
                }
            }
        }
    }

    match first_failure {
        Some((pipeline, reason)) => Err(CliError::PipelineFailed { pipeline, reason }),
        None => Ok(()),
    }
}

/// Wire up one pipeline: its own transaction manager, a TLV input adapter
/// with claim recovery, an empty stage chain and a plain output adapter.
fn build_pipeline(
    name: &str,
    pipeline: &PipelineConfig,
    config: &Config,
) -> CliResult<Pipeline<TransactionalOutputAdapter>> {
    let manager = Arc::new(TransactionManager::new(config.max_open_transactions, 2));
    let input = TransactionalInputAdapter::new(
        name,
        pipeline,
        Arc::clone(&manager),
        TlvRecordParser::factory(),
        passthrough_transform(),
        config.batch_size,
    )?;
    let output = TransactionalOutputAdapter::new(name, pipeline, single_line_expansion());
    Ok(Pipeline::new(
        name,
        manager,
        input,
        StageChain::new(),
        output,
        Duration::from_millis(config.poll_interval_ms),
    ))
}
