//! Pipeline driver
//!
//! A pipeline owns one input adapter, a stage chain and one output adapter,
//! and moves records between them in batches. Each `tick` loads at most one
//! batch, runs it through the stages, hands the result to the output, and
//! then reacts to the markers that survived processing: a header starts the
//! transaction on both adapters, a trailer collects their flush votes and
//! settles the transaction with the manager's commit-or-rollback decision.
//!
//! The driver is the only caller of participant callbacks, always in the
//! same order (input first, then output), on the one thread that owns the
//! adapters. The manager never calls into an adapter itself.

pub mod errors;
pub mod record;
pub mod stage;

pub use errors::{PipelineError, PipelineResult};
pub use record::{DataRecord, Record, RecordError, StreamMarker};
pub use stage::{Stage, StageChain};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::input::TransactionalInputAdapter;
use crate::observability::{Event, Logger, Severity};
use crate::output::OutputAdapter;
use crate::txn::{Outcome, TransactionClient, TransactionId, TransactionManager};

/// Batch-at-a-time driver for one mediation pipeline.
///
/// The manager passed in must be built for two participants per
/// transaction; the input and output adapters each cast one flush vote.
pub struct Pipeline<O: OutputAdapter> {
    name: String,
    manager: Arc<TransactionManager>,
    input: TransactionalInputAdapter,
    stages: StageChain,
    output: O,
    poll_interval: Duration,
}

impl<O: OutputAdapter> Pipeline<O> {
    pub fn new(
        name: impl Into<String>,
        manager: Arc<TransactionManager>,
        input: TransactionalInputAdapter,
        stages: StageChain,
        output: O,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            manager,
            input,
            stages,
            output,
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data records loaded from input since construction.
    pub fn records_loaded(&self) -> u64 {
        self.input.records_loaded()
    }

    /// One scheduler tick: move at most one batch end to end and settle
    /// every transaction whose trailer passed through. Returns the number
    /// of records moved; zero means there was nothing to do.
    pub fn tick(&mut self) -> PipelineResult<usize> {
        let batch = self.input.load_batch()?;
        if batch.is_empty() {
            return Ok(0);
        }
        let moved = batch.len();

        let batch = self.stages.process_batch(batch);
        self.output.write_batch(&batch);

        for entry in &batch {
            match entry {
                Record::Header(marker) => self.start_stream(marker.transaction)?,
                Record::Trailer(marker) => self.settle_stream(marker.transaction)?,
                Record::Data(_) => {}
            }
        }

        // Terminal callbacks and batch writes report fatals out of band;
        // surface them here so the poll loop stops.
        if let Some(error) = self.input.take_fatal_error() {
            return Err(error.into());
        }
        if let Some(error) = self.output.take_fatal_error() {
            return Err(error.into());
        }
        Ok(moved)
    }

    /// Drive the pipeline until it is quiescent or told to stop.
    ///
    /// With `drain` set the loop ends the first time nothing is claimed,
    /// nothing is queued and the input directory stayed empty for a tick.
    /// Without it the loop polls until `stop` is raised, then finishes the
    /// streams already claimed before returning.
    pub fn run(&mut self, stop: &AtomicBool, drain: bool) -> PipelineResult<()> {
        Logger::info(Event::PipelineStart, &[("pipeline", &self.name)]);
        let result = self.poll_loop(stop, drain);
        match &result {
            Ok(()) => Logger::info(Event::PipelineStop, &[("pipeline", &self.name)]),
            Err(error) => Logger::log(
                Severity::Fatal,
                Event::PipelineFailed,
                &[("pipeline", &self.name), ("reason", &error.to_string())],
            ),
        }
        result
    }

    fn poll_loop(&mut self, stop: &AtomicBool, drain: bool) -> PipelineResult<()> {
        loop {
            if stop.load(Ordering::SeqCst) {
                self.input.set_draining(true);
            }
            let moved = self.tick()?;
            if moved > 0 {
                continue;
            }
            let quiescent = self.input.in_flight() == 0 && !self.input.has_work();
            if quiescent && (drain || stop.load(Ordering::SeqCst)) {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Start the transaction on both participants. Either failure asks the
    /// manager for an abort; the stream still runs to its trailer so the
    /// rollback can settle through the normal path.
    fn start_stream(&mut self, txn: TransactionId) -> PipelineResult<()> {
        let input_ok = self.input.start_transaction(txn).is_ok();
        let output_ok = self.output.start_transaction(txn).is_ok();
        if !input_ok || !output_ok {
            self.manager.request_abort(txn)?;
        }
        Ok(())
    }

    /// Collect both flush votes and run the outcome's terminal callbacks.
    ///
    /// A failed flush still votes; it only flips the outcome to rollback.
    fn settle_stream(&mut self, txn: TransactionId) -> PipelineResult<()> {
        if !self.input.flush_transaction(txn).is_ok() {
            self.manager.request_abort(txn)?;
        }
        self.manager.set_transaction_flushed(txn)?;

        if !self.output.flush_transaction(txn).is_ok() {
            self.manager.request_abort(txn)?;
        }
        self.manager.set_transaction_flushed(txn)?;

        Logger::txn(
            Severity::Info,
            txn,
            Event::TransactionFlushed,
            &[("pipeline", &self.name)],
        );

        let outcome = self
            .manager
            .outcome(txn)
            .ok_or(PipelineError::MissingOutcome(txn))?;
        self.finish_stream(txn, outcome)
    }

    fn finish_stream(&mut self, txn: TransactionId, outcome: Outcome) -> PipelineResult<()> {
        match outcome {
            Outcome::Commit => {
                self.input.commit_transaction(txn);
                self.output.commit_transaction(txn);
                Logger::txn(
                    Severity::Info,
                    txn,
                    Event::TransactionCommitted,
                    &[("pipeline", &self.name)],
                );
            }
            Outcome::Rollback => {
                self.input.rollback_transaction(txn);
                self.output.rollback_transaction(txn);
                Logger::txn(
                    Severity::Info,
                    txn,
                    Event::TransactionRolledBack,
                    &[("pipeline", &self.name)],
                );
            }
        }

        self.input.close_transaction(txn);
        self.output.close_transaction(txn);
        self.manager.set_transaction_finished(txn, outcome)?;
        self.manager.close_transaction(txn)?;
        Logger::txn(
            Severity::Info,
            txn,
            Event::TransactionClosed,
            &[("pipeline", &self.name)],
        );
        Ok(())
    }
}
