//! Video generation provider adapters.
//!
//! Every vendor API is wrapped behind [`VideoProvider`]: submit a generation,
//! then poll the returned task until it completes or fails. The
//! [`ProviderRegistry`] resolves provider names (and aliases) to adapters.

pub mod adapters;
pub mod error;
pub mod http;
pub mod provider;
pub mod registry;
pub mod settings;

pub use adapters::{
    ArkProvider, ChatfireProvider, MinimaxProvider, PikaProvider, RunwayProvider, SoraProvider,
};
pub use error::{ProviderError, ProviderResult};
pub use provider::{PollOutcome, Submission, VideoProvider};
pub use registry::ProviderRegistry;
pub use settings::ProviderSettings;
