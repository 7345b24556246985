//! Pipeline driver errors

use thiserror::Error;

use crate::input::InputError;
use crate::output::OutputError;
use crate::txn::{TransactionId, TxnError};

/// Errors that stop a pipeline.
///
/// Adapter errors keep their own codes and severities; this enum only
/// aggregates them for the driver's poll loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Txn(#[from] TxnError),

    /// Both participants voted flush but the manager produced no
    /// decision; the manager was built for the wrong participant count.
    #[error("transaction {0} has no outcome after all flush votes")]
    MissingOutcome(TransactionId),
}

/// Result type for pipeline driver operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
