//! BER decode error types
//!
//! Error codes:
//! - CDR_BER_WRONG_STATE (ERROR severity)
//! - CDR_BER_END_OF_STREAM (ERROR severity)
//! - CDR_BER_END_OF_CONTENT (ERROR severity)
//! - CDR_BER_MALFORMED (ERROR severity)
//! - CDR_BER_READ_FAILED (FATAL severity)
//!
//! END_OF_STREAM and END_OF_CONTENT are expected terminal signals, carried
//! through the error channel so the read_tag/read_length/read_value return
//! types stay uniform; callers branch on `is_end_of_stream()` /
//! `is_end_of_content()` before treating a result as a failure.

use std::fmt;
use std::io;

/// Severity levels for BER decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The current file cannot be decoded, the pipeline continues
    Error,
    /// The underlying byte source is broken, the pipeline must stop
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

/// BER-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BerErrorCode {
    /// Operation called out of tag/length/value sequence
    CdrBerWrongState,
    /// No more bytes where the next tag was expected
    CdrBerEndOfStream,
    /// End-of-content marker terminating an indefinite-length value
    CdrBerEndOfContent,
    /// Framing violates BER encoding rules
    CdrBerMalformed,
    /// The underlying reader failed
    CdrBerReadFailed,
}

impl BerErrorCode {
    /// Returns the string form of the code.
    pub fn code(&self) -> &'static str {
        match self {
            BerErrorCode::CdrBerWrongState => "CDR_BER_WRONG_STATE",
            BerErrorCode::CdrBerEndOfStream => "CDR_BER_END_OF_STREAM",
            BerErrorCode::CdrBerEndOfContent => "CDR_BER_END_OF_CONTENT",
            BerErrorCode::CdrBerMalformed => "CDR_BER_MALFORMED",
            BerErrorCode::CdrBerReadFailed => "CDR_BER_READ_FAILED",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            BerErrorCode::CdrBerWrongState => Severity::Error,
            BerErrorCode::CdrBerEndOfStream => Severity::Error,
            BerErrorCode::CdrBerEndOfContent => Severity::Error,
            BerErrorCode::CdrBerMalformed => Severity::Error,
            BerErrorCode::CdrBerReadFailed => Severity::Fatal,
        }
    }
}

impl fmt::Display for BerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// BER decode error with context.
#[derive(Debug)]
pub struct BerError {
    /// Error code
    code: BerErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl BerError {
    /// Create a wrong-state error (operation called out of sequence).
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Self {
            code: BerErrorCode::CdrBerWrongState,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create an end-of-stream signal.
    pub fn end_of_stream() -> Self {
        Self {
            code: BerErrorCode::CdrBerEndOfStream,
            message: "no more bytes in source".to_string(),
            details: None,
            source: None,
        }
    }

    /// Create an end-of-content signal.
    pub fn end_of_content() -> Self {
        Self {
            code: BerErrorCode::CdrBerEndOfContent,
            message: "end-of-content marker".to_string(),
            details: None,
            source: None,
        }
    }

    /// Create a malformed-framing error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            code: BerErrorCode::CdrBerMalformed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a malformed-framing error with byte offset context.
    pub fn malformed_at(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: BerErrorCode::CdrBerMalformed,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create a read-failed error wrapping an I/O error.
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: BerErrorCode::CdrBerReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> BerErrorCode {
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

    /// True for the expected end-of-stream signal.
    pub fn is_end_of_stream(&self) -> bool {
        self.code == BerErrorCode::CdrBerEndOfStream
    }

    /// True for the expected end-of-content signal.
    pub fn is_end_of_content(&self) -> bool {
        self.code == BerErrorCode::CdrBerEndOfContent
    }

    /// Returns whether this error is fatal (the byte source is broken).
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for BerError {
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

impl std::error::Error for BerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for BER decode operations.
pub type BerResult<T> = Result<T, BerError>;
