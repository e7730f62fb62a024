//! In-process store, used by tests and single-run tools.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use reel_models::{GenerationId, GenerationJob, JobStatus, MergeId, MergeJob};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AggregateSink, EpisodeVideo, GenerationStore, MergeStore, StoryboardVideo};

/// Everything held behind `RwLock`s; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    generations: RwLock<HashMap<GenerationId, GenerationJob>>,
    merges: RwLock<HashMap<MergeId, MergeJob>>,
    storyboards: RwLock<HashMap<String, StoryboardVideo>>,
    episodes: RwLock<HashMap<String, EpisodeVideo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn storyboard(&self, storyboard_id: &str) -> Option<StoryboardVideo> {
        self.storyboards.read().await.get(storyboard_id).cloned()
    }

    pub async fn episode(&self, episode_id: &str) -> Option<EpisodeVideo> {
        self.episodes.read().await.get(episode_id).cloned()
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn create(&self, job: &GenerationJob) -> StoreResult<()> {
        let mut jobs = self.generations.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists(job.id.as_str()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &GenerationId) -> StoreResult<Option<GenerationJob>> {
        Ok(self.generations.read().await.get(id).cloned())
    }

    async fn update(&self, job: &GenerationJob) -> StoreResult<()> {
        let mut jobs = self.generations.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(job.id.as_str())),
        }
    }

    async fn update_if_status(&self, job: &GenerationJob, expected: JobStatus) -> StoreResult<bool> {
        let mut jobs = self.generations.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) if existing.status == expected => {
                *existing = job.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::not_found(job.id.as_str())),
        }
    }

    async fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<GenerationJob>> {
        let mut jobs: Vec<GenerationJob> = self
            .generations
            .read()
            .await
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl MergeStore for MemoryStore {
    async fn create(&self, job: &MergeJob) -> StoreResult<()> {
        let mut jobs = self.merges.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists(job.id.as_str()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &MergeId) -> StoreResult<Option<MergeJob>> {
        Ok(self.merges.read().await.get(id).cloned())
    }

    async fn update(&self, job: &MergeJob) -> StoreResult<()> {
        let mut jobs = self.merges.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(job.id.as_str())),
        }
    }

    async fn list(&self) -> StoreResult<Vec<MergeJob>> {
        let mut jobs: Vec<MergeJob> = self.merges.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl AggregateSink for MemoryStore {
    async fn storyboard_video_ready(
        &self,
        storyboard_id: &str,
        video_path: &str,
        duration: f64,
    ) -> StoreResult<()> {
        self.storyboards.write().await.insert(
            storyboard_id.to_string(),
            StoryboardVideo {
                storyboard_id: storyboard_id.to_string(),
                video_path: video_path.to_string(),
                duration,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn episode_merge_completed(&self, episode_id: &str, job: &MergeJob) -> StoreResult<()> {
        self.episodes
            .write()
            .await
            .insert(episode_id.to_string(), EpisodeVideo::from_merge(episode_id, job));
        Ok(())
    }
}
