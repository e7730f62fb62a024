//! Persistence seams consumed by the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_models::{GenerationId, GenerationJob, JobStatus, MergeId, MergeJob};

use crate::error::StoreResult;

/// Generation job records.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert a new job. Fails with `AlreadyExists` on id reuse.
    async fn create(&self, job: &GenerationJob) -> StoreResult<()>;

    async fn get(&self, id: &GenerationId) -> StoreResult<Option<GenerationJob>>;

    /// Replace an existing job. Fails with `NotFound` if it was never created.
    async fn update(&self, job: &GenerationJob) -> StoreResult<()>;

    /// Replace the job only while its persisted status is still `expected`.
    ///
    /// Returns `false`, writing nothing, when another writer moved it on.
    async fn update_if_status(&self, job: &GenerationJob, expected: JobStatus) -> StoreResult<bool>;

    /// Jobs sorted by creation time, newest first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<GenerationJob>>;

    /// Processing jobs, including those without a task id.
    async fn list_processing(&self) -> StoreResult<Vec<GenerationJob>> {
        self.list(Some(JobStatus::Processing)).await
    }
}

/// Merge job records.
#[async_trait]
pub trait MergeStore: Send + Sync {
    async fn create(&self, job: &MergeJob) -> StoreResult<()>;

    async fn get(&self, id: &MergeId) -> StoreResult<Option<MergeJob>>;

    async fn update(&self, job: &MergeJob) -> StoreResult<()>;

    /// Merges sorted by creation time, newest first.
    async fn list(&self) -> StoreResult<Vec<MergeJob>>;
}

/// Storyboard row updated when its clip is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardVideo {
    pub storyboard_id: String,
    pub video_path: String,
    pub duration: f64,
    pub updated_at: DateTime<Utc>,
}

/// Episode row updated when its merge completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeVideo {
    pub episode_id: String,
    pub merge_id: MergeId,
    pub status: JobStatus,
    pub video_path: String,
    pub duration: f64,
    pub updated_at: DateTime<Utc>,
}

impl EpisodeVideo {
    pub fn from_merge(episode_id: &str, job: &MergeJob) -> Self {
        Self {
            episode_id: episode_id.to_string(),
            merge_id: job.id.clone(),
            status: job.status,
            video_path: job.output_path.clone().unwrap_or_default(),
            duration: job.total_duration.unwrap_or_default(),
            updated_at: Utc::now(),
        }
    }
}

/// Side effects on aggregates owned by the surrounding CRUD layer.
#[async_trait]
pub trait AggregateSink: Send + Sync {
    async fn storyboard_video_ready(
        &self,
        storyboard_id: &str,
        video_path: &str,
        duration: f64,
    ) -> StoreResult<()>;

    async fn episode_merge_completed(&self, episode_id: &str, job: &MergeJob) -> StoreResult<()>;
}
