//! Input adapter error types
//!
//! Error codes:
//! - CDR_INPUT_OPEN_FAILED (FATAL severity)
//! - CDR_INPUT_READ_FAILED (FATAL severity)
//! - CDR_INPUT_PARSE_FAILED (ERROR severity)
//! - CDR_INPUT_CLAIM_FAILED (FATAL severity)
//! - CDR_INPUT_DISPOSE_FAILED (FATAL severity)
//! - CDR_INPUT_RECOVERY_FAILED (FATAL severity)
//! - CDR_INPUT_WRONG_STATE (FATAL severity)
//!
//! PARSE_FAILED is the only non-fatal code: a file whose content cannot be
//! decoded is disposed to the error name and the pipeline moves on. The
//! fatal codes all mean the directory protocol itself can no longer be
//! trusted (I/O failing, journal unwritable, terminal rename refused).

use std::fmt;
use std::io;

/// Severity levels for input adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// One file is lost to the error directory, the pipeline continues
    Error,
    /// The directory protocol is broken, the pipeline must stop
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

/// Input-adapter error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorCode {
    /// A claimed file could not be opened
    CdrInputOpenFailed,
    /// Reading an open stream failed at the I/O level
    CdrInputReadFailed,
    /// File content violates the configured record format
    CdrInputParseFailed,
    /// Journaling or executing a claim failed
    CdrInputClaimFailed,
    /// Terminal rename or disposition journaling failed
    CdrInputDisposeFailed,
    /// Startup claim recovery failed
    CdrInputRecoveryFailed,
    /// Adapter bookkeeping and transaction manager disagree
    CdrInputWrongState,
}

impl InputErrorCode {
    /// Returns the string form of the code.
    pub fn code(&self) -> &'static str {
        match self {
            InputErrorCode::CdrInputOpenFailed => "CDR_INPUT_OPEN_FAILED",
            InputErrorCode::CdrInputReadFailed => "CDR_INPUT_READ_FAILED",
            InputErrorCode::CdrInputParseFailed => "CDR_INPUT_PARSE_FAILED",
            InputErrorCode::CdrInputClaimFailed => "CDR_INPUT_CLAIM_FAILED",
            InputErrorCode::CdrInputDisposeFailed => "CDR_INPUT_DISPOSE_FAILED",
            InputErrorCode::CdrInputRecoveryFailed => "CDR_INPUT_RECOVERY_FAILED",
            InputErrorCode::CdrInputWrongState => "CDR_INPUT_WRONG_STATE",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            InputErrorCode::CdrInputParseFailed => Severity::Error,
            InputErrorCode::CdrInputOpenFailed
            | InputErrorCode::CdrInputReadFailed
            | InputErrorCode::CdrInputClaimFailed
            | InputErrorCode::CdrInputDisposeFailed
            | InputErrorCode::CdrInputRecoveryFailed
            | InputErrorCode::CdrInputWrongState => Severity::Fatal,
        }
    }
}

impl fmt::Display for InputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Input adapter error with context.
#[derive(Debug)]
pub struct InputError {
    /// Error code
    code: InputErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl InputError {
    /// Create an open-failed error wrapping an I/O error.
    pub fn open_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: InputErrorCode::CdrInputOpenFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a read-failed error wrapping an I/O error.
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: InputErrorCode::CdrInputReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a parse-failed error for an undecodable file.
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputParseFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a parse-failed error carrying the offending file name.
    pub fn parse_failed_in(file: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputParseFailed,
            message: message.into(),
            details: Some(format!("file: {}", file)),
            source: None,
        }
    }

    /// Create a claim-failed error.
    pub fn claim_failed(message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputClaimFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a dispose-failed error wrapping an I/O error.
    pub fn dispose_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: InputErrorCode::CdrInputDisposeFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a dispose-failed error without an I/O source.
    pub fn dispose_failed_msg(message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputDisposeFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a recovery-failed error.
    pub fn recovery_failed(message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputRecoveryFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a wrong-state error for broken internal bookkeeping.
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Self {
            code: InputErrorCode::CdrInputWrongState,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> InputErrorCode {
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

impl fmt::Display for InputError {
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

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for input adapter operations.
pub type InputResult<T> = Result<T, InputError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            InputErrorCode::CdrInputOpenFailed.code(),
            "CDR_INPUT_OPEN_FAILED"
        );
        assert_eq!(
            InputErrorCode::CdrInputParseFailed.code(),
            "CDR_INPUT_PARSE_FAILED"
        );
        assert_eq!(
            InputErrorCode::CdrInputDisposeFailed.code(),
            "CDR_INPUT_DISPOSE_FAILED"
        );
    }

    #[test]
    fn test_parse_failures_are_isolated() {
        let err = InputError::parse_failed_in("tmpCDR_001.dat", "not a TLV stream");
        assert!(!err.is_fatal());
        assert!(format!("{}", err).contains("tmpCDR_001.dat"));
    }

    #[test]
    fn test_io_failures_are_fatal() {
        let err = InputError::open_failed(
            "open failed",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_fatal());

        let err = InputError::dispose_failed(
            "rename to done name failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_fatal());
    }
}
