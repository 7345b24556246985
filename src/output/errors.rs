//! Output adapter error types
//!
//! Error codes:
//! - CDR_OUTPUT_OPEN_FAILED (ERROR severity)
//! - CDR_OUTPUT_WRITE_FAILED (ERROR severity)
//! - CDR_OUTPUT_CLOSE_FAILED (ERROR severity)
//! - CDR_OUTPUT_FINALIZE_FAILED (FATAL severity)
//! - CDR_OUTPUT_DISCARD_FAILED (ERROR severity)
//! - CDR_OUTPUT_WRONG_STATE (FATAL severity)
//!
//! Open, write and close failures are confined to one transaction: the
//! affected transaction rolls back and the pipeline continues. A finalize
//! failure happens after the commit decision, when the input side may
//! already have disposed its file, so it is fatal.

use std::fmt;
use std::io;

/// Severity levels for output adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One transaction's output is lost, the pipeline continues
    Error,
    /// Commit-side effects have diverged, the pipeline must stop
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Output-adapter error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputErrorCode {
    /// A per-transaction writer could not be opened
    CdrOutputOpenFailed,
    /// One record could not be written
    CdrOutputWriteFailed,
    /// A writer could not be closed cleanly
    CdrOutputCloseFailed,
    /// Commit-time rename or empty-file delete failed
    CdrOutputFinalizeFailed,
    /// Rollback-time delete failed
    CdrOutputDiscardFailed,
    /// Adapter bookkeeping violated the stream protocol
    CdrOutputWrongState,
}

impl OutputErrorCode {
    /// Returns the string form of the code.
    pub fn code(&self) -> &'static str {
        match self {
            OutputErrorCode::CdrOutputOpenFailed => "CDR_OUTPUT_OPEN_FAILED",
            OutputErrorCode::CdrOutputWriteFailed => "CDR_OUTPUT_WRITE_FAILED",
            OutputErrorCode::CdrOutputCloseFailed => "CDR_OUTPUT_CLOSE_FAILED",
            OutputErrorCode::CdrOutputFinalizeFailed => "CDR_OUTPUT_FINALIZE_FAILED",
            OutputErrorCode::CdrOutputDiscardFailed => "CDR_OUTPUT_DISCARD_FAILED",
            OutputErrorCode::CdrOutputWrongState => "CDR_OUTPUT_WRONG_STATE",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            OutputErrorCode::CdrOutputOpenFailed
            | OutputErrorCode::CdrOutputWriteFailed
            | OutputErrorCode::CdrOutputCloseFailed
            | OutputErrorCode::CdrOutputDiscardFailed => Severity::Error,
            OutputErrorCode::CdrOutputFinalizeFailed | OutputErrorCode::CdrOutputWrongState => {
                Severity::Fatal
            }
        }
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Output adapter error with context.
#[derive(Debug)]
pub struct OutputError {
    /// Error code
    code: OutputErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl OutputError {
    /// Create an open-failed error wrapping an I/O error.
    pub fn open_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputOpenFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a write-failed error wrapping an I/O error.
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputWriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a close-failed error wrapping an I/O error.
    pub fn close_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputCloseFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a finalize-failed error wrapping an I/O error.
    pub fn finalize_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputFinalizeFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a discard-failed error wrapping an I/O error.
    pub fn discard_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputDiscardFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a wrong-state error for a stream protocol violation.
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Self {
            code: OutputErrorCode::CdrOutputWrongState,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> OutputErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details.
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for output adapter operations.
pub type OutputResult<T> = Result<T, OutputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            OutputErrorCode::CdrOutputOpenFailed.code(),
            "CDR_OUTPUT_OPEN_FAILED"
        );
        assert_eq!(
            OutputErrorCode::CdrOutputFinalizeFailed.code(),
            "CDR_OUTPUT_FINALIZE_FAILED"
        );
    }

    #[test]
    fn test_transaction_scoped_failures_are_not_fatal() {
        let io = || io::Error::new(io::ErrorKind::Other, "disk");
        assert!(!OutputError::open_failed("open", io()).is_fatal());
        assert!(!OutputError::write_failed("write", io()).is_fatal());
        assert!(!OutputError::close_failed("close", io()).is_fatal());
        assert!(!OutputError::discard_failed("delete", io()).is_fatal());
    }

    #[test]
    fn test_commit_side_failures_are_fatal() {
        let err = OutputError::finalize_failed(
            "rename failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
        assert!(OutputError::wrong_state("data record outside a stream").is_fatal());
    }
}
