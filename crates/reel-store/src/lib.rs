//! Job persistence for the ReelForge orchestrator.
//!
//! This crate provides:
//! - `GenerationStore` / `MergeStore` traits over job records
//! - `AggregateSink` for storyboard and episode side effects
//! - `MemoryStore` for tests and `FileStore` for durable, restart-safe storage

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{AggregateSink, EpisodeVideo, GenerationStore, MergeStore, StoryboardVideo};
