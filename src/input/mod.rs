//! # Input Transaction Adapter
//!
//! Turns files appearing in a watched directory into bracketed record
//! streams with transactional disposition. The adapter claims a file by
//! rename, opens a transaction for it, emits a header marker, streams the
//! file's records in bounded batches, emits a trailer at end of file, and
//! finally renames the file to its done or error name when the transaction
//! manager decides the outcome.
//!
//! The adapter is either `Idle` (no stream open) or `Streaming` one file;
//! claimed transactions wait in a FIFO queue so a slow downstream commit
//! does not stall new file pickup. All state belongs to the single thread
//! driving the pipeline; the transaction manager is the only shared
//! component touched.

pub mod errors;
pub mod source;

pub use errors::{InputError, InputErrorCode, InputResult};
pub use source::{
    BatchParser, BinarySource, LineSource, RecordSource, SourceFactory, TlvRecordParser,
};

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::journal::{ClaimJournal, Disposition};
use crate::observability::{Event, Logger, Severity, StreamScope};
use crate::pipeline::{DataRecord, Record, StreamMarker};
use crate::resolver::{ClaimPaths, FileSetResolver};
use crate::txn::{CallbackStatus, TransactionClient, TransactionId, TransactionManager};

/// Per-record user transform; `None` suppresses the record.
pub type RecordTransform = Box<dyn FnMut(String) -> Option<DataRecord> + Send>;

/// Transform that wraps every raw record unchanged.
pub fn passthrough_transform() -> RecordTransform {
    Box::new(|data| Some(DataRecord::new(data)))
}

/// Paths and counters for one claimed file.
struct FileControl {
    paths: ClaimPaths,
    /// Data records emitted for the stream so far
    records: u64,
    /// True once the trailer has been emitted
    streamed: bool,
}

/// The one stream currently being read.
struct ActiveStream {
    txn: TransactionId,
    source: Box<dyn RecordSource>,
    scope: StreamScope,
}

/// Transactional file-to-record-stream adapter.
pub struct TransactionalInputAdapter {
    pipeline: String,
    resolver: FileSetResolver,
    journal: ClaimJournal,
    manager: Arc<TransactionManager>,
    source_factory: SourceFactory,
    transform: RecordTransform,
    batch_size: usize,
    /// Claimed transactions not yet streamed, in claim order
    queue: VecDeque<TransactionId>,
    control: HashMap<TransactionId, FileControl>,
    active: Option<ActiveStream>,
    /// When set, no new files are claimed; claimed streams still finish
    draining: bool,
    total_records: u64,
    fatal: Option<InputError>,
}

impl TransactionalInputAdapter {
    /// Build the adapter for one pipeline and recover any claims left
    /// behind by a previous process.
    pub fn new(
        pipeline: impl Into<String>,
        config: &PipelineConfig,
        manager: Arc<TransactionManager>,
        source_factory: SourceFactory,
        transform: RecordTransform,
        batch_size: usize,
    ) -> InputResult<Self> {
        let pipeline = pipeline.into();
        let resolver = FileSetResolver::from_config(config)
            .map_err(|e| InputError::claim_failed(format!("invalid file templates: {}", e)))?;

        let mut journal = ClaimJournal::open(resolver.input_dir()).map_err(|e| {
            Logger::log(
                Severity::Fatal,
                Event::RecoveryFailed,
                &[("pipeline", &pipeline), ("reason", &e.to_string())],
            );
            InputError::recovery_failed(format!("journal open failed: {}", e))
        })?;

        Logger::info(Event::RecoveryBegin, &[("pipeline", &pipeline)]);
        let recovered = journal.recover().map_err(|e| {
            Logger::log(
                Severity::Fatal,
                Event::RecoveryFailed,
                &[("pipeline", &pipeline), ("reason", &e.to_string())],
            );
            InputError::recovery_failed(format!("claim recovery failed: {}", e))
        })?;
        for claim in &recovered {
            if claim.returned {
                Logger::info(
                    Event::FileReturned,
                    &[
                        ("pipeline", &pipeline),
                        ("file", &claim.original.display().to_string()),
                    ],
                );
            }
        }
        Logger::info(
            Event::RecoveryComplete,
            &[
                ("pipeline", &pipeline),
                ("settled", &recovered.len().to_string()),
            ],
        );

        Ok(Self {
            pipeline,
            resolver,
            journal,
            manager,
            source_factory,
            transform,
            batch_size,
            queue: VecDeque::new(),
            control: HashMap::new(),
            active: None,
            draining: false,
            total_records: 0,
            fatal: None,
        })
    }

    /// One scheduler tick: claim new work if idle, then stream up to one
    /// batch of records.
    ///
    /// The returned batch holds at most `batch_size` records. A stream's
    /// header arrives in its first batch and its trailer in its last; an
    /// empty batch means there was nothing to do this tick.
    pub fn load_batch(&mut self) -> InputResult<Vec<Record>> {
        let mut batch = Vec::new();

        if self.active.is_none() {
            if !self.draining {
                self.claim_new_work()?;
            }
            self.open_next_stream(&mut batch)?;
        }

        let txn = self.active.as_ref().map(|active| active.txn);
        if txn.is_some() {
            self.fill_batch(&mut batch)?;
        }
        if let Some(txn) = txn {
            self.drain_if_aborted(txn, &mut batch);
        }

        if !batch.is_empty() {
            let count = batch.len().to_string();
            Logger::log(
                Severity::Trace,
                Event::BatchLoaded,
                &[("pipeline", &self.pipeline), ("records", &count)],
            );
        }
        Ok(batch)
    }

    /// Scan the input directory and claim candidates while the manager
    /// still has transaction capacity.
    fn claim_new_work(&mut self) -> InputResult<()> {
        let candidates = self
            .resolver
            .scan()
            .map_err(|e| InputError::claim_failed(format!("input directory scan failed: {}", e)))?;

        for name in candidates {
            if !self.manager.can_start_new_transaction() {
                break;
            }
            let txn = match self.manager.create_new_transaction() {
                Ok(txn) => txn,
                // Capacity raced away between the check and the allocation
                Err(_) => break,
            };
            Logger::txn(
                Severity::Info,
                txn,
                Event::TransactionOpened,
                &[("pipeline", &self.pipeline)],
            );

            match self.resolver.claim(&name, txn, &mut self.journal) {
                Ok(paths) => {
                    Logger::txn(
                        Severity::Info,
                        txn,
                        Event::FileClaimed,
                        &[("pipeline", &self.pipeline), ("file", &name)],
                    );
                    self.control.insert(
                        txn,
                        FileControl {
                            paths,
                            records: 0,
                            streamed: false,
                        },
                    );
                    self.queue.push_back(txn);
                }
                Err(e) if e.is_claim_race() => {
                    let _ = self.manager.cancel_transaction(txn);
                    Logger::txn(
                        Severity::Warn,
                        txn,
                        Event::ClaimLost,
                        &[("file", &name), ("reason", &e.to_string())],
                    );
                }
                Err(e) => {
                    let _ = self.manager.cancel_transaction(txn);
                    return Err(InputError::claim_failed(format!(
                        "claim of {} failed: {}",
                        name, e
                    )));
                }
            }
        }
        Ok(())
    }

    /// Open the stream for the transaction at the head of the queue,
    /// pushing its header marker.
    fn open_next_stream(&mut self, batch: &mut Vec<Record>) -> InputResult<()> {
        let txn = match self.queue.pop_front() {
            Some(txn) => txn,
            None => return Ok(()),
        };
        let (base, processing) = match self.control.get(&txn) {
            Some(control) => (control.paths.base.clone(), control.paths.processing.clone()),
            None => {
                return Err(InputError::wrong_state(format!(
                    "queued transaction {} has no control structure",
                    txn
                )))
            }
        };

        let source = match (self.source_factory)(&processing) {
            Ok(source) => source,
            Err(e) if !e.is_fatal() => {
                // The file cannot be decoded: dispose it to the error name
                // and free the slot. The pipeline keeps going.
                self.dispose_undecodable(txn, &e)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.manager.set_transaction_processing(txn).map_err(|e| {
            InputError::wrong_state(format!("cannot start stream for transaction {}: {}", txn, e))
        })?;
        Logger::txn(
            Severity::Info,
            txn,
            Event::TransactionProcessing,
            &[("file", &base)],
        );

        batch.push(Record::Header(StreamMarker::header(base.clone(), txn)));
        let scope = StreamScope::open(txn, &base);
        self.active = Some(ActiveStream { txn, source, scope });
        Ok(())
    }

    /// Move records from the active stream into the batch until the batch
    /// is full or the stream ends.
    fn fill_batch(&mut self, batch: &mut Vec<Record>) -> InputResult<()> {
        let txn = match self.active.as_ref() {
            Some(active) => active.txn,
            None => return Ok(()),
        };
        let mut finished = false;

        while batch.len() < self.batch_size {
            let active = match self.active.as_mut() {
                Some(active) => active,
                None => break,
            };
            match active.source.next_record() {
                Ok(Some(raw)) => {
                    if let Some(record) = (self.transform)(raw) {
                        active.scope.record();
                        if record.is_error() {
                            active.scope.error_record();
                        }
                        if let Some(control) = self.control.get_mut(&txn) {
                            control.records += 1;
                        }
                        self.total_records += 1;
                        batch.push(Record::Data(record));
                    }
                }
                Ok(None) => {
                    finished = true;
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // Undecodable mid-stream: doom the transaction and end
                    // the stream so the rollback machinery can run.
                    Logger::txn(
                        Severity::Error,
                        txn,
                        Event::AbortRequested,
                        &[("reason", e.message())],
                    );
                    let _ = self.manager.request_abort(txn);
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            self.finish_stream(txn, batch);
        }
        Ok(())
    }

    /// Close the active stream and push its trailer marker.
    fn finish_stream(&mut self, txn: TransactionId, batch: &mut Vec<Record>) {
        if let Some(active) = self.active.take() {
            active.scope.close();
        }
        let (base, records) = match self.control.get_mut(&txn) {
            Some(control) => {
                control.streamed = true;
                (control.paths.base.clone(), control.records)
            }
            None => (String::new(), 0),
        };
        batch.push(Record::Trailer(StreamMarker::trailer(base, txn, records)));
    }

    /// Discard a doomed transaction's data records, keeping the markers.
    fn drain_if_aborted(&mut self, txn: TransactionId, batch: &mut Vec<Record>) {
        if !self.manager.abort_requested(txn) {
            return;
        }
        let before = batch.len();
        batch.retain(|record| record.is_marker());
        let dropped = before - batch.len();
        if dropped > 0 {
            let count = dropped.to_string();
            Logger::txn(
                Severity::Info,
                txn,
                Event::RecordsDropped,
                &[("count", &count)],
            );
        }
    }

    /// Dispose a file whose content cannot be decoded: rename it to its
    /// error name, journal the disposition, release the transaction.
    fn dispose_undecodable(&mut self, txn: TransactionId, cause: &InputError) -> InputResult<()> {
        let paths = match self.control.remove(&txn) {
            Some(control) => control.paths,
            None => {
                return Err(InputError::wrong_state(format!(
                    "no control structure for transaction {}",
                    txn
                )))
            }
        };
        fs::rename(&paths.processing, &paths.error).map_err(|e| {
            InputError::dispose_failed(
                format!(
                    "failed to move undecodable file {} to {}",
                    paths.processing.display(),
                    paths.error.display()
                ),
                e,
            )
        })?;
        self.journal
            .record_disposition(txn, Disposition::Error)
            .map_err(|e| InputError::dispose_failed_msg(e.to_string()))?;
        let _ = self.manager.cancel_transaction(txn);
        Logger::txn(
            Severity::Error,
            txn,
            Event::FileError,
            &[("file", &paths.base), ("reason", cause.message())],
        );
        Ok(())
    }

    fn commit_file(&mut self, txn: TransactionId) -> InputResult<()> {
        let paths = match self.control.get(&txn) {
            Some(control) => control.paths.clone(),
            None => {
                return Err(InputError::wrong_state(format!(
                    "commit for unknown transaction {}",
                    txn
                )))
            }
        };
        fs::rename(&paths.processing, &paths.done).map_err(|e| {
            InputError::dispose_failed(
                format!(
                    "failed to rename {} to {}",
                    paths.processing.display(),
                    paths.done.display()
                ),
                e,
            )
        })?;
        self.journal
            .record_disposition(txn, Disposition::Done)
            .map_err(|e| InputError::dispose_failed_msg(e.to_string()))?;
        Logger::txn(Severity::Info, txn, Event::FileDone, &[("file", &paths.base)]);
        Ok(())
    }

    fn rollback_file(&mut self, txn: TransactionId) -> InputResult<()> {
        let paths = match self.control.get(&txn) {
            Some(control) => control.paths.clone(),
            None => {
                return Err(InputError::wrong_state(format!(
                    "rollback for unknown transaction {}",
                    txn
                )))
            }
        };
        fs::rename(&paths.processing, &paths.error).map_err(|e| {
            InputError::dispose_failed(
                format!(
                    "failed to rename {} to {}",
                    paths.processing.display(),
                    paths.error.display()
                ),
                e,
            )
        })?;
        self.journal
            .record_disposition(txn, Disposition::Error)
            .map_err(|e| InputError::dispose_failed_msg(e.to_string()))?;
        Logger::txn(
            Severity::Info,
            txn,
            Event::FileError,
            &[("file", &paths.base)],
        );
        Ok(())
    }

    fn record_fatal(&mut self, txn: TransactionId, error: InputError) {
        Logger::txn(
            Severity::Fatal,
            txn,
            Event::PipelineFailed,
            &[("pipeline", &self.pipeline), ("reason", &error.to_string())],
        );
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    /// A fatal error raised inside a terminal callback, if any. The driver
    /// checks this after running callbacks and stops the pipeline.
    pub fn take_fatal_error(&mut self) -> Option<InputError> {
        self.fatal.take()
    }

    /// Stop or resume claiming new files. Streams already claimed still
    /// run to completion, so a draining pipeline winds down cleanly.
    pub fn set_draining(&mut self, draining: bool) {
        self.draining = draining;
    }

    /// True while a stream is open or claimed files are waiting.
    pub fn has_work(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    /// Transactions claimed and not yet closed.
    pub fn in_flight(&self) -> usize {
        self.control.len()
    }

    /// Data records loaded since construction, across all streams.
    pub fn records_loaded(&self) -> u64 {
        self.total_records
    }
}

impl TransactionClient for TransactionalInputAdapter {
    fn start_transaction(&mut self, id: TransactionId) -> CallbackStatus {
        if self.control.contains_key(&id) {
            CallbackStatus::Ok
        } else {
            CallbackStatus::Failed
        }
    }

    fn flush_transaction(&mut self, id: TransactionId) -> CallbackStatus {
        match self.control.get(&id) {
            Some(control) if control.streamed => CallbackStatus::Ok,
            _ => CallbackStatus::Failed,
        }
    }

    fn commit_transaction(&mut self, id: TransactionId) {
        if let Err(e) = self.commit_file(id) {
            self.record_fatal(id, e);
        }
    }

    fn rollback_transaction(&mut self, id: TransactionId) {
        if let Err(e) = self.rollback_file(id) {
            self.record_fatal(id, e);
        }
    }

    fn close_transaction(&mut self, id: TransactionId) {
        self.control.remove(&id);
        self.queue.retain(|&queued| queued != id);
    }
}
