//! Error types for inbox triage.

use std::time::Duration;

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Conflicting configuration: {0}")]
    Conflict(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail-store connector errors.
///
/// Never retried inside the pipeline; retry policy belongs to the connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Authentication failed for {source_name}: {reason}")]
    AuthFailed { source_name: String, reason: String },

    #[error("Quota exceeded for {source_name}")]
    QuotaExceeded { source_name: String },

    #[error("Source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Malformed data from {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Draft generator errors. Always recovered by the template fallback.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Draft generator timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Draft generator {provider} quota exhausted")]
    Quota { provider: String },

    #[error("Draft generator {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// A single malformed record. The record is skipped; the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Record {message_id} has no sender")]
    MissingSender { message_id: String },

    #[error("Record {message_id} has no timestamp")]
    MissingTimestamp { message_id: String },

    #[error("Record at position {position} has no message id")]
    MissingMessageId { position: usize },
}

/// Batch-level pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No usable records: all {skipped} input record(s) were rejected")]
    NoUsableRecords { skipped: usize },

    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] ConnectorError),
}

/// Result type alias for triage runs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_with_input() -> Result<()> {
        let raw: std::result::Result<(), InputError> =
            Err(InputError::MissingMessageId { position: 3 });
        raw?;
        Ok(())
    }

    #[test]
    fn stage_errors_fold_into_top_level() {
        let err = fails_with_input().unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert_eq!(
            err.to_string(),
            "Input error: Record at position 3 has no message id"
        );

        let ingest: PipelineError = ConnectorError::QuotaExceeded {
            source_name: "inbox".into(),
        }
        .into();
        let err: Error = ingest.into();
        assert!(err.to_string().contains("Quota exceeded for inbox"));
    }
}
