//! Claim journal error types
//!
//! Error codes:
//! - CDR_JOURNAL_APPEND_FAILED (ERROR severity)
//! - CDR_JOURNAL_FSYNC_FAILED (FATAL severity)
//! - CDR_JOURNAL_CORRUPTION (FATAL severity)
//! - CDR_JOURNAL_RECOVERY_FAILED (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for journal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails, the pipeline continues without the claim
    Error,
    /// Claim accounting can no longer be trusted, the pipeline must stop
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

/// Journal-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalErrorCode {
    /// Journal write failed
    CdrJournalAppendFailed,
    /// Journal fsync failed
    CdrJournalFsyncFailed,
    /// Journal checksum failure away from the tail
    CdrJournalCorruption,
    /// A recovery rename failed
    CdrJournalRecoveryFailed,
}

impl JournalErrorCode {
    /// Returns the string form of the code.
    pub fn code(&self) -> &'static str {
        match self {
            JournalErrorCode::CdrJournalAppendFailed => "CDR_JOURNAL_APPEND_FAILED",
            JournalErrorCode::CdrJournalFsyncFailed => "CDR_JOURNAL_FSYNC_FAILED",
            JournalErrorCode::CdrJournalCorruption => "CDR_JOURNAL_CORRUPTION",
            JournalErrorCode::CdrJournalRecoveryFailed => "CDR_JOURNAL_RECOVERY_FAILED",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            JournalErrorCode::CdrJournalAppendFailed => Severity::Error,
            JournalErrorCode::CdrJournalFsyncFailed => Severity::Fatal,
            JournalErrorCode::CdrJournalCorruption => Severity::Fatal,
            JournalErrorCode::CdrJournalRecoveryFailed => Severity::Fatal,
        }
    }
}

impl fmt::Display for JournalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Journal error with context.
#[derive(Debug)]
pub struct JournalError {
    /// Error code
    code: JournalErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl JournalError {
    /// Create an append-failed error.
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: JournalErrorCode::CdrJournalAppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create an fsync-failed error.
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: JournalErrorCode::CdrJournalFsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a corruption error with byte offset context.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: JournalErrorCode::CdrJournalCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create a recovery-failed error.
    pub fn recovery_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: JournalErrorCode::CdrJournalRecoveryFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> JournalErrorCode {
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

    /// Returns whether this error is fatal (the pipeline must stop).
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for JournalError {
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

impl std::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;
