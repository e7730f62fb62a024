//! Provider error types.

use thiserror::Error;

use reel_models::ReferenceMode;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by provider adapters and the registry.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown video provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {0} is not configured")]
    NotConfigured(String),

    #[error("unsupported mode for provider {provider}: {mode}")]
    UnsupportedMode {
        provider: String,
        mode: ReferenceMode,
    },

    #[error("{provider} API error (status {status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} returned an unreadable response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} error: {message}")]
    Rejected { provider: String, message: String },

    #[error("Invalid reference image: {0}")]
    InvalidReference(String),
}

impl ProviderError {
    pub fn unsupported_mode(provider: impl Into<String>, mode: ReferenceMode) -> Self {
        Self::UnsupportedMode {
            provider: provider.into(),
            mode,
        }
    }

    pub fn transport(provider: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Transport blips and 5xx/429 answers; worth polling again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
