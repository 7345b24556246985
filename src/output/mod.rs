//! # Output Transaction Adapter
//!
//! Mirror of the input adapter in the write direction. The header of a
//! stream opens processing-named output and error files for its
//! transaction, data records are expanded into lines and appended to the
//! writer matching their classification, and the trailer closes the
//! writers. On commit each file is renamed to its final name, or deleted
//! when it is empty and the empty-file policy says so; on rollback every
//! processing-named file is deleted so no partial output survives.
//!
//! Failures are never raised out of `write_batch`. A record that cannot
//! be written goes to a shared sink so one bad record does not abort its
//! batch; an open or close failure marks the transaction's control failed,
//! which turns its flush vote into `Failed` and forces a rollback.
//!
//! Streams arrive bracketed and unnested (the input side reads one file at
//! a time), so the owner of incoming data records is always the stream
//! whose header passed most recently.

pub mod errors;
pub mod routed;

pub use errors::{OutputError, OutputErrorCode, OutputResult};
pub use routed::{RoutedOutputAdapter, StreamClassifier};

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::observability::{Event, Logger, Severity};
use crate::pipeline::{DataRecord, Record};
use crate::txn::{CallbackStatus, TransactionClient, TransactionId};

/// Per-record fan-out; one record may expand into zero or more output
/// lines, the inverse of the input side's record compression.
pub type RecordExpansion = Box<dyn FnMut(&DataRecord) -> Vec<String> + Send>;

/// Expansion that writes every record's payload as a single line.
pub fn single_line_expansion() -> RecordExpansion {
    Box::new(|record| vec![record.data.clone()])
}

/// The driver-facing surface of an output adapter.
///
/// The plain and the routed adapter both implement this; the pipeline
/// driver does not care how records map onto files.
pub trait OutputAdapter: TransactionClient + Send {
    /// Consume one batch, reacting to its markers.
    fn write_batch(&mut self, batch: &[Record]);

    /// A fatal error raised inside a terminal callback, if any. The
    /// driver checks this after running callbacks and stops the pipeline.
    fn take_fatal_error(&mut self) -> Option<OutputError>;
}

/// What commit did with one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeOutcome {
    Renamed,
    Deleted,
}

/// One processing-named file under construction.
///
/// The slot owns the buffered writer and both path names. `close` must
/// run before `finalize`; rollback may `discard` at any point.
pub(crate) struct WriterSlot {
    processing: PathBuf,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
    /// Lines appended so far; zero means the file is empty on disk
    lines: u64,
    delete_if_empty: bool,
}

impl WriterSlot {
    pub(crate) fn open(
        processing: PathBuf,
        final_path: PathBuf,
        delete_if_empty: bool,
    ) -> OutputResult<Self> {
        let file = File::create(&processing).map_err(|e| {
            OutputError::open_failed(format!("cannot create {}", processing.display()), e)
        })?;
        Ok(Self {
            processing,
            final_path,
            writer: Some(BufWriter::new(file)),
            lines: 0,
            delete_if_empty,
        })
    }

    pub(crate) fn write_line(&mut self, line: &str) -> OutputResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            OutputError::wrong_state(format!(
                "write to closed writer {}",
                self.processing.display()
            ))
        })?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| {
                OutputError::write_failed(
                    format!("cannot append to {}", self.processing.display()),
                    e,
                )
            })?;
        self.lines += 1;
        Ok(())
    }

    /// Flush buffered lines and sync the file to disk.
    pub(crate) fn close(&mut self) -> OutputResult<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| {
                OutputError::close_failed(
                    format!("cannot flush {}", self.processing.display()),
                    e.into_error(),
                )
            })?;
            file.sync_all().map_err(|e| {
                OutputError::close_failed(format!("cannot sync {}", self.processing.display()), e)
            })?;
        }
        Ok(())
    }

    /// Commit the slot: delete an empty file under the policy, otherwise
    /// rename it to its final name.
    pub(crate) fn finalize(&self) -> OutputResult<FinalizeOutcome> {
        if self.lines == 0 && self.delete_if_empty {
            fs::remove_file(&self.processing).map_err(|e| {
                OutputError::finalize_failed(
                    format!("cannot delete empty {}", self.processing.display()),
                    e,
                )
            })?;
            return Ok(FinalizeOutcome::Deleted);
        }
        fs::rename(&self.processing, &self.final_path).map_err(|e| {
            OutputError::finalize_failed(
                format!(
                    "cannot rename {} to {}",
                    self.processing.display(),
                    self.final_path.display()
                ),
                e,
            )
        })?;
        Ok(FinalizeOutcome::Renamed)
    }

    /// Roll the slot back: drop the writer and delete the processing file.
    /// A file that is already gone counts as discarded.
    pub(crate) fn discard(&mut self) -> OutputResult<()> {
        self.writer = None;
        match fs::remove_file(&self.processing) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OutputError::discard_failed(
                format!("cannot delete {}", self.processing.display()),
                e,
            )),
        }
    }
}

/// Commit one slot and log the outcome; returns the failure, if any.
pub(crate) fn finalize_slot(
    pipeline: &str,
    txn: TransactionId,
    slot: WriterSlot,
) -> Option<OutputError> {
    match slot.finalize() {
        Ok(FinalizeOutcome::Renamed) => {
            let file = slot.final_path.display().to_string();
            let lines = slot.lines.to_string();
            Logger::txn(
                Severity::Info,
                txn,
                Event::OutputFinalized,
                &[("pipeline", pipeline), ("file", &file), ("lines", &lines)],
            );
            None
        }
        Ok(FinalizeOutcome::Deleted) => {
            let file = slot.processing.display().to_string();
            Logger::txn(
                Severity::Info,
                txn,
                Event::OutputDiscarded,
                &[("pipeline", pipeline), ("file", &file), ("reason", "empty")],
            );
            None
        }
        Err(error) => Some(error),
    }
}

/// Roll one slot back and log the outcome. Rollback is best-effort
/// cleanup, so a failed delete is logged and swallowed.
pub(crate) fn discard_slot(pipeline: &str, txn: TransactionId, slot: &mut WriterSlot) {
    let file = slot.processing.display().to_string();
    match slot.discard() {
        Ok(()) => Logger::txn(
            Severity::Info,
            txn,
            Event::OutputDiscarded,
            &[("pipeline", pipeline), ("file", &file), ("reason", "rollback")],
        ),
        Err(error) => {
            let detail = error.to_string();
            Logger::txn(
                Severity::Error,
                txn,
                Event::OutputDiscarded,
                &[("pipeline", pipeline), ("file", &file), ("error", &detail)],
            );
        }
    }
}

/// Shared sink for per-record write failures.
///
/// One bad record must not abort its batch: the failure is logged against
/// the stream it belongs to, counted, and the batch moves on.
pub struct WriteErrorSink {
    dropped: u64,
}

impl WriteErrorSink {
    pub fn new() -> Self {
        Self { dropped: 0 }
    }

    /// Records dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn report(&mut self, txn: TransactionId, base: &str, error: &OutputError) {
        self.dropped += 1;
        let detail = error.to_string();
        Logger::txn(
            Severity::Error,
            txn,
            Event::RecordWriteFailed,
            &[("file", base), ("error", &detail)],
        );
    }
}

impl Default for WriteErrorSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Writers and status for one transaction's stream.
struct OutputControl {
    base: String,
    output: Option<WriterSlot>,
    /// `None` in single-writer mode; error records then share the output
    /// slot
    error: Option<WriterSlot>,
    /// True once the trailer closed the writers cleanly
    closed: bool,
    /// Set on open or close failure; dooms the transaction to rollback
    failed: bool,
}

/// Transactional record-stream-to-file adapter.
pub struct TransactionalOutputAdapter {
    pipeline: String,
    output_dir: PathBuf,
    output_prefix: String,
    output_suffix: String,
    err_dir: PathBuf,
    err_prefix: String,
    err_suffix: String,
    processing_prefix: String,
    single_writer: bool,
    delete_empty_output: bool,
    delete_empty_error: bool,
    expansion: RecordExpansion,
    control: HashMap<TransactionId, OutputControl>,
    /// Stream owning incoming data records, set by the last header
    current: Option<TransactionId>,
    sink: WriteErrorSink,
    fatal: Option<OutputError>,
    lines_written: u64,
}

impl TransactionalOutputAdapter {
    pub fn new(
        pipeline: impl Into<String>,
        config: &PipelineConfig,
        expansion: RecordExpansion,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            output_dir: PathBuf::from(&config.output_file_path),
            output_prefix: config.output_file_prefix.clone(),
            output_suffix: config.output_file_suffix.clone(),
            err_dir: PathBuf::from(&config.err_file_path),
            err_prefix: config.err_file_prefix.clone(),
            err_suffix: config.err_file_suffix.clone(),
            processing_prefix: config.processing_prefix.clone(),
            single_writer: config.single_writer(),
            delete_empty_output: config.delete_empty_output_file,
            delete_empty_error: config.delete_empty_error_file,
            expansion,
            control: HashMap::new(),
            current: None,
            sink: WriteErrorSink::new(),
            fatal: None,
            lines_written: 0,
        }
    }

    fn open_stream(&mut self, txn: TransactionId, base: &str) {
        self.current = Some(txn);
        if self.control.contains_key(&txn) {
            self.record_fatal(OutputError::wrong_state(format!(
                "duplicate header for transaction {}",
                txn
            )));
            return;
        }

        let mut control = OutputControl {
            base: base.to_string(),
            output: None,
            error: None,
            closed: false,
            failed: false,
        };
        match self.open_slots(base) {
            Ok((output, error)) => {
                let writers = if error.is_some() { "2" } else { "1" };
                control.output = Some(output);
                control.error = error;
                Logger::txn(
                    Severity::Info,
                    txn,
                    Event::OutputOpened,
                    &[("pipeline", &self.pipeline), ("file", base), ("writers", writers)],
                );
            }
            Err(error) => {
                control.failed = true;
                let detail = error.to_string();
                Logger::txn(
                    Severity::Error,
                    txn,
                    Event::OutputOpenFailed,
                    &[("pipeline", &self.pipeline), ("file", base), ("error", &detail)],
                );
            }
        }
        self.control.insert(txn, control);
    }

    fn open_slots(&self, base: &str) -> OutputResult<(WriterSlot, Option<WriterSlot>)> {
        let mut output = WriterSlot::open(
            self.output_processing(base),
            self.output_final(base),
            self.delete_empty_output,
        )?;
        if self.single_writer {
            return Ok((output, None));
        }
        match WriterSlot::open(
            self.error_processing(base),
            self.error_final(base),
            self.delete_empty_error,
        ) {
            Ok(error) => Ok((output, Some(error))),
            Err(e) => {
                // A half-opened stream leaves no file behind.
                let _ = output.discard();
                Err(e)
            }
        }
    }

    fn write_record(&mut self, data: &DataRecord) {
        let txn = match self.current {
            Some(txn) => txn,
            None => {
                self.record_fatal(OutputError::wrong_state(
                    "data record outside any stream".to_string(),
                ));
                return;
            }
        };
        let control = match self.control.get_mut(&txn) {
            Some(control) => control,
            None => {
                self.record_fatal(OutputError::wrong_state(format!(
                    "no writers for transaction {}",
                    txn
                )));
                return;
            }
        };
        if control.failed {
            return;
        }

        let to_error = data.is_error() && control.error.is_some();
        let slot = if to_error {
            control.error.as_mut()
        } else {
            control.output.as_mut()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => return,
        };

        let mut written = 0u64;
        for line in (self.expansion)(data) {
            match slot.write_line(&line) {
                Ok(()) => written += 1,
                Err(error) => self.sink.report(txn, &control.base, &error),
            }
        }
        self.lines_written += written;
    }

    fn close_stream(&mut self, txn: TransactionId) {
        if self.current == Some(txn) {
            self.current = None;
        }
        let control = match self.control.get_mut(&txn) {
            Some(control) => control,
            None => {
                self.record_fatal(OutputError::wrong_state(format!(
                    "trailer for unknown transaction {}",
                    txn
                )));
                return;
            }
        };
        if control.failed {
            return;
        }

        // Both writers are closed even if the first close fails.
        let mut failure: Option<String> = None;
        for slot in control.output.iter_mut().chain(control.error.iter_mut()) {
            if let Err(error) = slot.close() {
                failure.get_or_insert(error.to_string());
            }
        }
        match failure {
            None => control.closed = true,
            Some(detail) => {
                control.failed = true;
                Logger::txn(
                    Severity::Error,
                    txn,
                    Event::OutputCloseFailed,
                    &[
                        ("pipeline", &self.pipeline),
                        ("file", &control.base),
                        ("error", &detail),
                    ],
                );
            }
        }
    }

    fn output_processing(&self, base: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}{}{}{}",
            self.processing_prefix, self.output_prefix, base, self.output_suffix
        ))
    }

    fn output_final(&self, base: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}{}", self.output_prefix, base, self.output_suffix))
    }

    fn error_processing(&self, base: &str) -> PathBuf {
        self.err_dir.join(format!(
            "{}{}{}{}",
            self.processing_prefix, self.err_prefix, base, self.err_suffix
        ))
    }

    fn error_final(&self, base: &str) -> PathBuf {
        self.err_dir
            .join(format!("{}{}{}", self.err_prefix, base, self.err_suffix))
    }

    fn record_fatal(&mut self, error: OutputError) {
        Logger::log(
            Severity::Fatal,
            Event::PipelineFailed,
            &[("pipeline", &self.pipeline), ("reason", &error.to_string())],
        );
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    /// Lines appended since construction, across all streams.
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Records dropped by per-record write failures.
    pub fn records_dropped(&self) -> u64 {
        self.sink.dropped()
    }

    /// Transactions currently holding writers.
    pub fn open_streams(&self) -> usize {
        self.control.len()
    }
}

impl OutputAdapter for TransactionalOutputAdapter {
    /// Headers open the transaction's writers, trailers close them, and
    /// data records are expanded and appended to the writer matching
    /// their classification.
    fn write_batch(&mut self, batch: &[Record]) {
        for record in batch {
            match record {
                Record::Header(marker) => self.open_stream(marker.transaction, &marker.base_name),
                Record::Data(data) => self.write_record(data),
                Record::Trailer(marker) => self.close_stream(marker.transaction),
            }
        }
    }

    fn take_fatal_error(&mut self) -> Option<OutputError> {
        self.fatal.take()
    }
}

impl TransactionClient for TransactionalOutputAdapter {
    fn start_transaction(&mut self, id: TransactionId) -> CallbackStatus {
        match self.control.get(&id) {
            Some(control) if !control.failed => CallbackStatus::Ok,
            _ => CallbackStatus::Failed,
        }
    }

    fn flush_transaction(&mut self, id: TransactionId) -> CallbackStatus {
        match self.control.get(&id) {
            Some(control) if control.closed && !control.failed => CallbackStatus::Ok,
            _ => CallbackStatus::Failed,
        }
    }

    fn commit_transaction(&mut self, id: TransactionId) {
        let control = match self.control.remove(&id) {
            Some(control) => control,
            None => {
                self.record_fatal(OutputError::wrong_state(format!(
                    "commit for unknown transaction {}",
                    id
                )));
                return;
            }
        };
        if control.failed || !control.closed {
            self.record_fatal(OutputError::wrong_state(format!(
                "commit for unflushed transaction {}",
                id
            )));
            return;
        }
        for slot in control.output.into_iter().chain(control.error) {
            if let Some(error) = finalize_slot(&self.pipeline, id, slot) {
                self.record_fatal(error);
            }
        }
    }

    fn rollback_transaction(&mut self, id: TransactionId) {
        if let Some(mut control) = self.control.remove(&id) {
            for slot in control.output.iter_mut().chain(control.error.iter_mut()) {
                discard_slot(&self.pipeline, id, slot);
            }
        }
        if self.current == Some(id) {
            self.current = None;
        }
    }

    fn close_transaction(&mut self, id: TransactionId) {
        self.control.remove(&id);
        if self.current == Some(id) {
            self.current = None;
        }
    }
}
