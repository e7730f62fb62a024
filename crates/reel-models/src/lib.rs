//! Shared data models for the ReelForge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation requests, reference inputs and generation jobs
//! - Merge requests, clip definitions and merge jobs
//! - The shared job status state machine
//! - Encoding presets used by the compositor

pub mod encoding;
pub mod error;
pub mod generation;
pub mod merge;
pub mod request;
pub mod status;

pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use generation::{CompletedMedia, GenerationId, GenerationJob};
pub use merge::{
    ClipSpec, MergeId, MergeJob, MergeRequest, Transition, DEFAULT_TRANSITION_SECONDS,
};
pub use request::{
    is_remote_url, GenerationOptions, GenerationRequest, ReferenceInput, ReferenceMode,
};
pub use status::JobStatus;
