//! # Resolver Errors

use thiserror::Error;

use crate::journal::JournalError;

/// Result type for resolver operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// File-set resolver errors
#[derive(Debug, Error)]
pub enum ResolveError {
    // Scan errors
    #[error("Failed to scan input directory {dir}: {reason}")]
    ScanFailed { dir: String, reason: String },

    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),

    // Claim errors
    #[error("File {file} is not a scan candidate")]
    NotACandidate { file: String },

    #[error("Lost claim race for {file}: {reason}")]
    ClaimLost { file: String, reason: String },

    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl ResolveError {
    /// True for a lost claim race, which is expected and non-fatal.
    pub fn is_claim_race(&self) -> bool {
        matches!(self, ResolveError::ClaimLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_race_classification() {
        let err = ResolveError::ClaimLost {
            file: "CDR_001.dat".to_string(),
            reason: "No such file".to_string(),
        };
        assert!(err.is_claim_race());

        let err = ResolveError::ScanFailed {
            dir: "/data/in".to_string(),
            reason: "Permission denied".to_string(),
        };
        assert!(!err.is_claim_race());
    }
}
