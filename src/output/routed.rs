//! Multi-stream output for record splitting and routing.
//!
//! Generalizes the single output file into a per-record routing: a
//! pluggable classifier assigns every valid record an integer stream
//! number, and each number gets its own writer, opened lazily the first
//! time it appears within the transaction. Stream `s` of base `B` is
//! written under the processing name `{prefix}B_s{suffix}` and committed
//! without the processing marker.
//!
//! Error records are not routed; they all go to the transaction's one
//! error file, as in the plain adapter. `SingleOutputFile` has no meaning
//! here and is ignored.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::observability::{Event, Logger, Severity};
use crate::pipeline::{DataRecord, Record};
use crate::txn::{CallbackStatus, TransactionClient, TransactionId};

use super::errors::OutputError;
use super::{
    discard_slot, finalize_slot, OutputAdapter, RecordExpansion, WriteErrorSink, WriterSlot,
};

/// Assigns each valid record to an integer output stream.
pub type StreamClassifier = Box<dyn FnMut(&DataRecord) -> u32 + Send>;

/// Writers and status for one transaction's routed streams.
struct RoutedControl {
    base: String,
    /// Stream number to its writer, populated on first sight
    streams: HashMap<u32, WriterSlot>,
    error: Option<WriterSlot>,
    closed: bool,
    failed: bool,
}

/// Output adapter splitting each stream across numbered files.
pub struct RoutedOutputAdapter {
    pipeline: String,
    output_dir: PathBuf,
    output_prefix: String,
    output_suffix: String,
    err_dir: PathBuf,
    err_prefix: String,
    err_suffix: String,
    processing_prefix: String,
    delete_empty_output: bool,
    delete_empty_error: bool,
    classifier: StreamClassifier,
    expansion: RecordExpansion,
    control: HashMap<TransactionId, RoutedControl>,
    current: Option<TransactionId>,
    sink: WriteErrorSink,
    fatal: Option<OutputError>,
    lines_written: u64,
}

impl RoutedOutputAdapter {
    pub fn new(
        pipeline: impl Into<String>,
        config: &PipelineConfig,
        classifier: StreamClassifier,
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
            delete_empty_output: config.delete_empty_output_file,
            delete_empty_error: config.delete_empty_error_file,
            classifier,
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

        let mut control = RoutedControl {
            base: base.to_string(),
            streams: HashMap::new(),
            error: None,
            closed: false,
            failed: false,
        };
        // Only the error file opens on the header; routed writers wait for
        // their first record.
        match WriterSlot::open(
            self.error_processing(base),
            self.error_final(base),
            self.delete_empty_error,
        ) {
            Ok(slot) => {
                control.error = Some(slot);
                Logger::txn(
                    Severity::Info,
                    txn,
                    Event::OutputOpened,
                    &[("pipeline", &self.pipeline), ("file", base), ("writers", "error")],
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
        let route = if data.is_error() {
            None
        } else {
            Some((self.classifier)(data))
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

        let slot = match route {
            Some(stream) => {
                if !control.streams.contains_key(&stream) {
                    let processing = self.output_dir.join(format!(
                        "{}{}{}_{}{}",
                        self.processing_prefix,
                        self.output_prefix,
                        control.base,
                        stream,
                        self.output_suffix
                    ));
                    let final_path = self.output_dir.join(format!(
                        "{}{}_{}{}",
                        self.output_prefix, control.base, stream, self.output_suffix
                    ));
                    match WriterSlot::open(processing, final_path, self.delete_empty_output) {
                        Ok(opened) => {
                            let stream_str = stream.to_string();
                            Logger::txn(
                                Severity::Info,
                                txn,
                                Event::OutputOpened,
                                &[
                                    ("pipeline", &self.pipeline),
                                    ("file", &control.base),
                                    ("stream", &stream_str),
                                ],
                            );
                            control.streams.insert(stream, opened);
                        }
                        Err(error) => {
                            control.failed = true;
                            let detail = error.to_string();
                            Logger::txn(
                                Severity::Error,
                                txn,
                                Event::OutputOpenFailed,
                                &[
                                    ("pipeline", &self.pipeline),
                                    ("file", &control.base),
                                    ("error", &detail),
                                ],
                            );
                            return;
                        }
                    }
                }
                control.streams.get_mut(&stream)
            }
            None => control.error.as_mut(),
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

        let mut failure: Option<String> = None;
        for slot in control
            .streams
            .values_mut()
            .chain(control.error.iter_mut())
        {
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

impl OutputAdapter for RoutedOutputAdapter {
    /// Valid records go to their classified stream's writer, error
    /// records to the transaction's one error file.
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

impl TransactionClient for RoutedOutputAdapter {
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
        for (_, slot) in control.streams {
            if let Some(error) = finalize_slot(&self.pipeline, id, slot) {
                self.record_fatal(error);
            }
        }
        if let Some(slot) = control.error {
            if let Some(error) = finalize_slot(&self.pipeline, id, slot) {
                self.record_fatal(error);
            }
        }
    }

    fn rollback_transaction(&mut self, id: TransactionId) {
        if let Some(mut control) = self.control.remove(&id) {
            for slot in control
                .streams
                .values_mut()
                .chain(control.error.iter_mut())
            {
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
