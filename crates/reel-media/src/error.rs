//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// The engine's stderr is part of the message; it is the only way to diagnose bad filter graphs.
    #[error(
        "FFmpeg command failed: {message}{}",
        .stderr.as_deref().map(|s| format!("\n{}", s.trim_end())).unwrap_or_default()
    )]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error(
        "FFprobe command failed: {message}{}",
        .stderr.as_deref().map(|s| format!("\n{}", s.trim_end())).unwrap_or_default()
    )]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Failed to resolve clip source {source_ref}: {message}")]
    SourceUnavailable { source_ref: String, message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid merge input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create a source resolution error.
    pub fn source_unavailable(source_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_ref: source_ref.into(),
            message: message.into(),
        }
    }

    pub fn invalid_video(message: impl Into<String>) -> Self {
        Self::InvalidVideo(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_error_keeps_stderr_verbatim() {
        let err = MediaError::ffmpeg_failed(
            "exit status 1",
            Some("[AVFilterGraph] No such filter: 'xfadee'\n".to_string()),
            Some(1),
        );
        let text = err.to_string();
        assert!(text.starts_with("FFmpeg command failed: exit status 1"));
        assert!(text.contains("No such filter: 'xfadee'"));
    }

    #[test]
    fn test_ffmpeg_error_without_stderr() {
        let err = MediaError::ffmpeg_failed("killed", None, None);
        assert_eq!(err.to_string(), "FFmpeg command failed: killed");
    }
}
