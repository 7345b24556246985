//! Per-stream timing scope
//!
//! A stream is one input file flowing through the pipeline. The scope logs
//! STREAM_OPEN when created, counts records, and logs STREAM_CLOSE with the
//! elapsed wall time and totals when finished.

use std::time::Instant;

use super::events::Event;
use super::logger::{Logger, Severity};
use crate::txn::TransactionId;

/// Tracks one stream from open to close.
pub struct StreamScope {
    txn: TransactionId,
    base_name: String,
    started: Instant,
    records: u64,
    errors: u64,
    closed: bool,
}

impl StreamScope {
    /// Open a scope and log the stream start.
    pub fn open(txn: TransactionId, base_name: &str) -> Self {
        Logger::txn(
            Severity::Info,
            txn,
            Event::StreamOpen,
            &[("file", base_name)],
        );
        StreamScope {
            txn,
            base_name: base_name.to_string(),
            started: Instant::now(),
            records: 0,
            errors: 0,
            closed: false,
        }
    }

    /// Count one data record.
    pub fn record(&mut self) {
        self.records += 1;
    }

    /// Count one error record.
    pub fn error_record(&mut self) {
        self.errors += 1;
    }

    /// Records seen so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Error records seen so far.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Close the scope, logging totals and elapsed time.
    pub fn close(mut self) {
        self.emit_close();
    }

    fn emit_close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let elapsed_ms = self.started.elapsed().as_millis().to_string();
        let records = self.records.to_string();
        let errors = self.errors.to_string();
        Logger::txn(
            Severity::Info,
            self.txn,
            Event::StreamClose,
            &[
                ("file", self.base_name.as_str()),
                ("records", records.as_str()),
                ("errors", errors.as_str()),
                ("elapsed_ms", elapsed_ms.as_str()),
            ],
        );
    }
}

impl Drop for StreamScope {
    // A scope dropped during an abort still closes its log bracket.
    fn drop(&mut self) {
        self.emit_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let mut scope = StreamScope::open(1, "CDR_0001.dat");
        scope.record();
        scope.record();
        scope.error_record();
        assert_eq!(scope.records(), 2);
        assert_eq!(scope.errors(), 1);
        scope.close();
    }

    #[test]
    fn test_drop_without_close_does_not_panic() {
        let mut scope = StreamScope::open(2, "CDR_0002.dat");
        scope.record();
        drop(scope);
    }
}
