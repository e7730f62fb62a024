//! Generation and merge job orchestration.
//!
//! - [`GenerationManager`] submits to a video provider, polls the task and
//!   localizes the result
//! - [`MergeManager`] runs the compositor over an ordered clip list
//!
//! Both persist every transition through `reel-store`, so a restarted process
//! can resume polling with [`GenerationManager::recover`].

mod active;
pub mod config;
pub mod error;
pub mod generation;
pub mod localize;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod retry;

pub use config::{PollingConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use generation::{
    GenerationManager, MigrationSummary, RecoverySummary, CANCELLED_MESSAGE,
    SUBMISSION_INTERRUPTED_MESSAGE,
};
pub use localize::MediaLocalizer;
pub use logging::{init_tracing, JobLogger};
pub use merge::{MergeManager, INTERRUPTED_MESSAGE};
pub use retry::{retry_async, FailureTracker, RetryConfig};
