//! Transaction participant callbacks
//!
//! Each adapter taking part in a transaction implements `TransactionClient`.
//! The pipeline driver invokes the callbacks in participant order on the one
//! thread that owns the adapters; the manager decides outcomes but never
//! calls into an adapter itself.

use super::TransactionId;

/// Result of a participant callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// The participant completed the step
    Ok,
    /// The participant could not complete the step; forces a rollback
    Failed,
}

impl CallbackStatus {
    /// True for the success status.
    pub fn is_ok(&self) -> bool {
        matches!(self, CallbackStatus::Ok)
    }
}

/// Callbacks a transaction participant must provide.
///
/// The driver guarantees the call order per transaction:
/// `start_transaction`, then zero or more batches, then `flush_transaction`,
/// then exactly one of `commit_transaction` / `rollback_transaction`, then
/// `close_transaction`. Commit, rollback and close are terminal cleanup and
/// return nothing; failures inside them are logged by the participant and
/// left to journal recovery.
pub trait TransactionClient {
    /// The transaction's stream is about to start.
    fn start_transaction(&mut self, id: TransactionId) -> CallbackStatus;

    /// All records for the transaction have been delivered.
    ///
    /// A `Failed` return (a writer could not be closed cleanly) makes the
    /// driver request an abort so the outcome becomes a rollback.
    fn flush_transaction(&mut self, id: TransactionId) -> CallbackStatus;

    /// Make the transaction's file effects permanent.
    fn commit_transaction(&mut self, id: TransactionId);

    /// Discard the transaction's file effects.
    fn rollback_transaction(&mut self, id: TransactionId);

    /// Drop all per-transaction state.
    fn close_transaction(&mut self, id: TransactionId);
}
