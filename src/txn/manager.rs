//! Concrete transaction manager
//!
//! The manager is the arbiter of transaction capacity and the authority for
//! the commit-or-rollback decision. It is the single shared component of a
//! deployment: adapters and pipeline drivers on different threads all talk
//! to one instance, so its state sits behind a mutex. Calls never block
//! beyond the lock; adapters treat the manager as a non-blocking query plus
//! fire-and-forget notifications.
//!
//! Lifecycle per transaction:
//! `Opening -> Processing -> Flushed -> FinishedOk | FinishedErr -> Closed`.
//! A transaction reaches `Flushed` once every registered participant has
//! voted flush; the outcome is then `Commit` unless an abort was requested.
//! `cancel_transaction` short-circuits `Opening -> Closed` for claims that
//! lost the rename race.

use std::collections::HashMap;
use std::sync::Mutex;

use super::errors::{TxnError, TxnResult};
use super::TransactionId;

/// Lifecycle status of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Slot allocated, file claimed, stream not yet started
    Opening,
    /// Records are flowing
    Processing,
    /// Every participant has flushed; outcome is available
    Flushed,
    /// Committed
    FinishedOk,
    /// Rolled back
    FinishedErr,
    /// Slot released
    Closed,
}

/// The commit-or-rollback decision for a flushed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

/// Per-transaction bookkeeping.
#[derive(Debug)]
struct TxnState {
    status: TransactionStatus,
    flush_votes: usize,
    abort_requested: bool,
}

#[derive(Debug)]
struct ManagerInner {
    /// Next id to hand out; ids start at 1 and are never reused
    next_id: TransactionId,
    open: HashMap<TransactionId, TxnState>,
}

/// Shared, internally synchronized transaction manager.
#[derive(Debug)]
pub struct TransactionManager {
    /// Maximum number of concurrently open transactions
    max_open: usize,
    /// Flush votes required before a transaction is considered flushed
    participants: usize,
    inner: Mutex<ManagerInner>,
}

impl TransactionManager {
    /// Create a manager allowing `max_open` concurrent transactions, each
    /// completed by `participants` flush votes.
    pub fn new(max_open: usize, participants: usize) -> Self {
        Self {
            max_open,
            participants,
            inner: Mutex::new(ManagerInner {
                next_id: 1,
                open: HashMap::new(),
            }),
        }
    }

    /// Whether a new transaction may be opened right now.
    pub fn can_start_new_transaction(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.open.len() < self.max_open
    }

    /// Allocate a transaction slot and return its id.
    pub fn create_new_transaction(&self) -> TxnResult<TransactionId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.open.len() >= self.max_open {
            return Err(TxnError::CapacityExhausted {
                open: inner.open.len(),
                max: self.max_open,
            });
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.open.insert(
            id,
            TxnState {
                status: TransactionStatus::Opening,
                flush_votes: 0,
                abort_requested: false,
            },
        );
        Ok(id)
    }

    /// Release a transaction that never started (lost claim race).
    pub fn cancel_transaction(&self, id: TransactionId) -> TxnResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        if state.status != TransactionStatus::Opening {
            return Err(TxnError::InvalidTransition {
                id,
                from: state.status,
                to: TransactionStatus::Closed,
            });
        }
        inner.open.remove(&id);
        Ok(())
    }

    /// Record that the transaction's stream has started.
    pub fn set_transaction_processing(&self, id: TransactionId) -> TxnResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get_mut(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        if state.status != TransactionStatus::Opening {
            return Err(TxnError::InvalidTransition {
                id,
                from: state.status,
                to: TransactionStatus::Processing,
            });
        }
        state.status = TransactionStatus::Processing;
        Ok(())
    }

    /// Count one participant's flush vote.
    ///
    /// The transaction advances to `Flushed` when all participants have
    /// voted; only then does `outcome` return a decision.
    pub fn set_transaction_flushed(&self, id: TransactionId) -> TxnResult<()> {
        let participants = self.participants;
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get_mut(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        match state.status {
            TransactionStatus::Processing | TransactionStatus::Flushed => {}
            from => {
                return Err(TxnError::InvalidTransition {
                    id,
                    from,
                    to: TransactionStatus::Flushed,
                })
            }
        }
        if state.flush_votes >= participants {
            return Err(TxnError::ExcessFlushVote { id, participants });
        }
        state.flush_votes += 1;
        if state.flush_votes == participants {
            state.status = TransactionStatus::Flushed;
        }
        Ok(())
    }

    /// Ask the transaction to abort at its next opportunity.
    ///
    /// Legal at any point before the transaction finishes; the last call
    /// before the outcome is read decides nothing extra, the flag is sticky.
    pub fn request_abort(&self, id: TransactionId) -> TxnResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get_mut(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        match state.status {
            TransactionStatus::Opening
            | TransactionStatus::Processing
            | TransactionStatus::Flushed => {
                state.abort_requested = true;
                Ok(())
            }
            from => Err(TxnError::InvalidTransition {
                id,
                from,
                to: TransactionStatus::FinishedErr,
            }),
        }
    }

    /// Whether an abort has been requested. Unknown ids answer false.
    pub fn abort_requested(&self, id: TransactionId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .open
            .get(&id)
            .map(|state| state.abort_requested)
            .unwrap_or(false)
    }

    /// The commit-or-rollback decision, once every participant has flushed.
    ///
    /// `None` while votes are still outstanding or the id is unknown.
    pub fn outcome(&self, id: TransactionId) -> Option<Outcome> {
        let inner = self.inner.lock().unwrap();
        let state = inner.open.get(&id)?;
        if state.status != TransactionStatus::Flushed {
            return None;
        }
        if state.abort_requested {
            Some(Outcome::Rollback)
        } else {
            Some(Outcome::Commit)
        }
    }

    /// Record that the outcome's callbacks have run on all participants.
    pub fn set_transaction_finished(&self, id: TransactionId, outcome: Outcome) -> TxnResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get_mut(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        let to = match outcome {
            Outcome::Commit => TransactionStatus::FinishedOk,
            Outcome::Rollback => TransactionStatus::FinishedErr,
        };
        if state.status != TransactionStatus::Flushed {
            return Err(TxnError::InvalidTransition {
                id,
                from: state.status,
                to,
            });
        }
        state.status = to;
        Ok(())
    }

    /// Release the transaction's slot.
    pub fn close_transaction(&self, id: TransactionId) -> TxnResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .open
            .get(&id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        match state.status {
            TransactionStatus::FinishedOk | TransactionStatus::FinishedErr => {
                inner.open.remove(&id);
                Ok(())
            }
            from => Err(TxnError::InvalidTransition {
                id,
                from,
                to: TransactionStatus::Closed,
            }),
        }
    }

    /// Current lifecycle status, `None` once closed or never created.
    pub fn status(&self, id: TransactionId) -> Option<TransactionStatus> {
        let inner = self.inner.lock().unwrap();
        inner.open.get(&id).map(|state| state.status)
    }

    /// Number of transactions currently holding a slot.
    pub fn open_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.open.len()
    }
}
