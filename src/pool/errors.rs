//! Worker pool errors

use thiserror::Error;

/// Errors from submitting to or winding down the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every worker already holds a job; the pool never queues.
    #[error("no idle worker ({size} of {size} busy)")]
    NoIdleWorker { size: usize },

    /// Workers were still busy when the join timeout elapsed.
    #[error("workers still busy after {waited_ms} ms")]
    JoinTimeout { waited_ms: u64 },

    /// The pool has been closed and accepts no further work.
    #[error("worker pool is closed")]
    Closed,
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_condition() {
        let error = PoolError::NoIdleWorker { size: 4 };
        assert!(error.to_string().contains("no idle worker"));

        let error = PoolError::JoinTimeout { waited_ms: 500 };
        assert!(error.to_string().contains("500 ms"));
    }
}
