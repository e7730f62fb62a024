//! Model validation errors.

use thiserror::Error;

use crate::request::ReferenceMode;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Reference mode '{mode}' requires {field}")]
    MissingReference { mode: ReferenceMode, field: &'static str },

    #[error("Merge request must contain at least one clip")]
    EmptyClips,

    #[error("Duplicate clip order {0} in merge request")]
    DuplicateClipOrder(i32),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn missing_reference(mode: ReferenceMode, field: &'static str) -> Self {
        Self::MissingReference { mode, field }
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
