//! Worker error types.

use thiserror::Error;

use reel_media::MediaError;
use reel_models::ModelError;
use reel_providers::ProviderError;
use reel_storage::StorageError;
use reel_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job is already {status}: {id}")]
    AlreadyTerminal { id: String, status: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed provider answer; retrying cannot fix it.
    #[error("Provider contract violation: {0}")]
    ContractViolation(String),

    #[error("Generation timed out after {attempts} polling attempts ({elapsed_secs}s)")]
    Timeout { attempts: u32, elapsed_secs: u64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ModelError> for WorkerError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn contract_violation(msg: impl Into<String>) -> Self {
        Self::ContractViolation(msg.into())
    }

    /// Network blips during polling or download.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(e) => e.is_transient(),
            WorkerError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Failures that end the job on first sight.
    pub fn is_permanent_failure(&self) -> bool {
        match self {
            WorkerError::Validation(_)
            | WorkerError::ContractViolation(_)
            | WorkerError::Timeout { .. }
            | WorkerError::Media(_) => true,
            WorkerError::Provider(e) => !e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transient = WorkerError::from(ProviderError::transport("ark", "connection reset"));
        assert!(transient.is_retryable());
        assert!(!transient.is_permanent_failure());

        let violation = WorkerError::contract_violation("completed without a result URL");
        assert!(!violation.is_retryable());
        assert!(violation.is_permanent_failure());

        let ffmpeg = WorkerError::from(MediaError::ffmpeg_failed(
            "merge failed",
            Some("Invalid filtergraph".into()),
            Some(1),
        ));
        assert!(ffmpeg.is_permanent_failure());
        assert!(ffmpeg.to_string().contains("Invalid filtergraph"));
    }

    #[test]
    fn test_timeout_message_names_attempts_and_elapsed() {
        let err = WorkerError::Timeout {
            attempts: 300,
            elapsed_secs: 3000,
        };
        assert_eq!(
            err.to_string(),
            "Generation timed out after 300 polling attempts (3000s)"
        );
    }

    #[test]
    fn test_model_error_is_validation() {
        let err = WorkerError::from(ModelError::EmptyClips);
        assert!(matches!(err, WorkerError::Validation(_)));
    }
}
