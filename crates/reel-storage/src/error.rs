//! Storage error types.

use thiserror::Error;

use reel_media::MediaError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage and localization.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Download of {url} failed: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download of {url} exceeded {seconds}s deadline")]
    DownloadTimeout { url: String, seconds: u64 },

    #[error("Inline encoding failed: {0}")]
    InlineEncoding(String),

    #[error("Probe failed: {0}")]
    Probe(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn download_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Map a reqwest error for `url`, keeping deadline hits distinguishable.
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::DownloadTimeout {
                url: url.to_string(),
                seconds: timeout_secs,
            }
        } else {
            Self::download_failed(url, err.to_string())
        }
    }

    /// Network-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DownloadFailed { .. } | Self::DownloadTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let server = StorageError::HttpStatus {
            url: "https://x/v.mp4".into(),
            status: 503,
        };
        let missing = StorageError::HttpStatus {
            url: "https://x/v.mp4".into(),
            status: 404,
        };
        assert!(server.is_transient());
        assert!(!missing.is_transient());
        assert!(!StorageError::invalid_path("../etc").is_transient());
    }
}
