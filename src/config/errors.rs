//! # Configuration Errors
//!
//! Every configuration error is fatal at startup, before any file is
//! touched.

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    // Load errors
    #[error("Failed to read config file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Invalid config JSON: {0}")]
    InvalidJson(String),

    // Shape errors
    #[error("No pipelines configured")]
    NoPipelines,

    #[error("Pipeline '{pipeline}': InputFilePrefix and InputFileSuffix are both empty, the scan would match every file")]
    EmptyGlob { pipeline: String },

    #[error("Pipeline '{pipeline}': ProcessingPrefix must not be empty")]
    EmptyProcessingPrefix { pipeline: String },

    #[error("Pipeline '{pipeline}': colliding path templates: {detail}")]
    CollidingTemplates { pipeline: String, detail: String },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    // Directory errors
    #[error("Pipeline '{pipeline}': {key} directory does not exist: {path}")]
    MissingDirectory {
        pipeline: String,
        key: String,
        path: String,
    },

    #[error("Pipeline '{pipeline}': {key} is not a directory: {path}")]
    NotADirectory {
        pipeline: String,
        key: String,
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_pipeline() {
        let err = ConfigError::EmptyGlob {
            pipeline: "voice".to_string(),
        };
        assert!(err.to_string().contains("voice"));

        let err = ConfigError::MissingDirectory {
            pipeline: "voice".to_string(),
            key: "DoneFilePath".to_string(),
            path: "/data/done".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("DoneFilePath"));
        assert!(display.contains("/data/done"));
    }
}
