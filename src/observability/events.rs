//! Lifecycle events emitted by the mediation pipeline
//!
//! Every observable state change in the file/transaction lifecycle has a
//! typed event with a stable wire name. Downstream log scrapers key on the
//! names, so they never change once shipped.

use std::fmt;

/// Observable events across the pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Pipeline lifecycle
    /// A pipeline poll loop has started
    PipelineStart,
    /// A pipeline has drained and stopped
    PipelineStop,
    /// A pipeline hit an unrecoverable failure (FATAL)
    PipelineFailed,

    // Claim recovery (startup)
    /// Journal replay begins
    RecoveryBegin,
    /// Journal replay complete
    RecoveryComplete,
    /// Journal unreadable or inconsistent (FATAL)
    RecoveryFailed,

    // File-set resolution
    /// Input file claimed by rename
    FileClaimed,
    /// Claim rename lost a race with another process
    ClaimLost,
    /// Input file renamed to its done name
    FileDone,
    /// Input file renamed to its error name
    FileError,
    /// Processing-named file returned to its original name on recovery
    FileReturned,

    // Transaction lifecycle
    /// Transaction number allocated
    TransactionOpened,
    /// Transaction marked processing (stream open)
    TransactionProcessing,
    /// Transaction marked flushed (stream fully read)
    TransactionFlushed,
    /// Transaction committed on all participants
    TransactionCommitted,
    /// Transaction rolled back on all participants
    TransactionRolledBack,
    /// Transaction closed and slot released
    TransactionClosed,
    /// Abort requested for an in-flight transaction
    AbortRequested,

    // Record streaming
    /// A batch of records left the input adapter
    BatchLoaded,
    /// Records discarded from a doomed transaction's batch
    RecordsDropped,
    /// Input stream opened (header emitted)
    StreamOpen,
    /// Input stream closed (trailer emitted)
    StreamClose,

    // Output side
    /// Per-transaction output writers opened
    OutputOpened,
    /// Output writers could not be opened (forces rollback)
    OutputOpenFailed,
    /// Processing-named output renamed to its final name
    OutputFinalized,
    /// Processing-named output deleted (rollback or empty-file policy)
    OutputDiscarded,
    /// A single record failed to write (batch continues)
    RecordWriteFailed,
    /// An output writer failed to close cleanly (forces rollback)
    OutputCloseFailed,
}

impl Event {
    /// Stable wire name for the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PipelineStart => "PIPELINE_START",
            Event::PipelineStop => "PIPELINE_STOP",
            Event::PipelineFailed => "PIPELINE_FAILED",

            Event::RecoveryBegin => "CLAIM_RECOVERY_BEGIN",
            Event::RecoveryComplete => "CLAIM_RECOVERY_COMPLETE",
            Event::RecoveryFailed => "CLAIM_RECOVERY_FAILED",

            Event::FileClaimed => "FILE_CLAIMED",
            Event::ClaimLost => "CLAIM_RACE_LOST",
            Event::FileDone => "FILE_DONE",
            Event::FileError => "FILE_ERROR",
            Event::FileReturned => "FILE_RETURNED",

            Event::TransactionOpened => "TXN_OPEN",
            Event::TransactionProcessing => "TXN_PROCESSING",
            Event::TransactionFlushed => "TXN_FLUSHED",
            Event::TransactionCommitted => "TXN_COMMIT",
            Event::TransactionRolledBack => "TXN_ROLLBACK",
            Event::TransactionClosed => "TXN_CLOSED",
            Event::AbortRequested => "TXN_ABORT_REQUESTED",

            Event::BatchLoaded => "BATCH_LOADED",
            Event::RecordsDropped => "RECORDS_DROPPED",
            Event::StreamOpen => "STREAM_OPEN",
            Event::StreamClose => "STREAM_CLOSE",

            Event::OutputOpened => "OUTPUT_OPEN",
            Event::OutputOpenFailed => "OUTPUT_OPEN_FAILED",
            Event::OutputFinalized => "OUTPUT_FINALIZED",
            Event::OutputDiscarded => "OUTPUT_DISCARDED",
            Event::RecordWriteFailed => "RECORD_WRITE_FAILED",
            Event::OutputCloseFailed => "OUTPUT_CLOSE_FAILED",
        }
    }

    /// True if the event indicates the pipeline cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::PipelineFailed | Event::RecoveryFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_are_screaming_snake() {
        let events = [
            Event::PipelineStart,
            Event::PipelineStop,
            Event::PipelineFailed,
            Event::RecoveryBegin,
            Event::RecoveryComplete,
            Event::RecoveryFailed,
            Event::FileClaimed,
            Event::ClaimLost,
            Event::FileDone,
            Event::FileError,
            Event::FileReturned,
            Event::TransactionOpened,
            Event::TransactionProcessing,
            Event::TransactionFlushed,
            Event::TransactionCommitted,
            Event::TransactionRolledBack,
            Event::TransactionClosed,
            Event::AbortRequested,
            Event::BatchLoaded,
            Event::RecordsDropped,
            Event::StreamOpen,
            Event::StreamClose,
            Event::OutputOpened,
            Event::OutputOpenFailed,
            Event::OutputFinalized,
            Event::OutputDiscarded,
            Event::RecordWriteFailed,
            Event::OutputCloseFailed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::PipelineFailed.is_fatal());
        assert!(Event::RecoveryFailed.is_fatal());
        assert!(!Event::FileClaimed.is_fatal());
        assert!(!Event::TransactionCommitted.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::FileClaimed), "FILE_CLAIMED");
        assert_eq!(format!("{}", Event::TransactionRolledBack), "TXN_ROLLBACK");
    }
}
