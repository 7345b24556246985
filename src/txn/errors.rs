//! # Transaction Manager Errors

use thiserror::Error;

use super::manager::TransactionStatus;
use super::TransactionId;

/// Result type for transaction manager operations
pub type TxnResult<T> = Result<T, TxnError>;

/// Transaction manager errors
#[derive(Debug, Clone, Error)]
pub enum TxnError {
    // Identity errors
    #[error("Transaction {0} is not known to the manager")]
    UnknownTransaction(TransactionId),

    // Lifecycle errors
    #[error("Transaction {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Transaction {id} received more flush votes than participants ({participants})")]
    ExcessFlushVote {
        id: TransactionId,
        participants: usize,
    },

    // Capacity errors
    #[error("No transaction slot available ({open} of {max} open)")]
    CapacityExhausted { open: usize, max: usize },
}
