//! Durable JSON-file store.
//!
//! Layout under the data directory:
//!
//! ```text
//! generations/<id>.json
//! merges/<id>.json
//! storyboards/<storyboard_id>.json
//! episodes/<episode_id>.json
//! ```
//!
//! Writes go to a `.tmp` sibling and are renamed into place, so a crash never
//! leaves a half-written record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use reel_models::{GenerationId, GenerationJob, JobStatus, MergeId, MergeJob};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AggregateSink, EpisodeVideo, GenerationStore, MergeStore, StoryboardVideo};

const GENERATIONS: &str = "generations";
const MERGES: &str = "merges";
const STORYBOARDS: &str = "storyboards";
const EPISODES: &str = "episodes";

/// One JSON document per record.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes writers so create's existence check and the rename cannot interleave
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [GENERATIONS, MERGES, STORYBOARDS, EPISODES] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: &str) -> StoreResult<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StoreError::not_found(id));
        }
        Ok(self.root.join(kind).join(format!("{}.json", id)))
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::corrupt(path.display().to_string(), e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(&self, path: &Path, record: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), "Wrote record");
        Ok(())
    }

    async fn insert<T: Serialize>(&self, kind: &str, id: &str, record: &T) -> StoreResult<()> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::already_exists(id));
        }
        self.write(&path, record).await
    }

    async fn replace<T: Serialize>(&self, kind: &str, id: &str, record: &T) -> StoreResult<()> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::not_found(id));
        }
        self.write(&path, record).await
    }

    /// Replace a generation record if its persisted status equals `expected`.
    async fn replace_generation_if(
        &self,
        job: &GenerationJob,
        expected: JobStatus,
    ) -> StoreResult<bool> {
        let path = self.record_path(GENERATIONS, job.id.as_str())?;
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.read::<GenerationJob>(&path).await? else {
            return Err(StoreError::not_found(job.id.as_str()));
        };
        if current.status != expected {
            return Ok(false);
        }
        self.write(&path, job).await?;
        Ok(true)
    }

    async fn upsert<T: Serialize>(&self, kind: &str, id: &str, record: &T) -> StoreResult<()> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, record).await
    }

    /// Every readable record of one kind. Corrupt files are skipped with a warning.
    async fn scan<T: DeserializeOwned>(&self, kind: &str) -> StoreResult<Vec<T>> {
        let mut entries = tokio::fs::read_dir(self.root.join(kind)).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read::<T>(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        Ok(records)
    }

    pub async fn storyboard(&self, storyboard_id: &str) -> StoreResult<Option<StoryboardVideo>> {
        let path = self.record_path(STORYBOARDS, storyboard_id)?;
        self.read(&path).await
    }

    pub async fn episode(&self, episode_id: &str) -> StoreResult<Option<EpisodeVideo>> {
        let path = self.record_path(EPISODES, episode_id)?;
        self.read(&path).await
    }
}

#[async_trait]
impl GenerationStore for FileStore {
    async fn create(&self, job: &GenerationJob) -> StoreResult<()> {
        self.insert(GENERATIONS, job.id.as_str(), job).await
    }

    async fn get(&self, id: &GenerationId) -> StoreResult<Option<GenerationJob>> {
        match self.record_path(GENERATIONS, id.as_str()) {
            Ok(path) => self.read(&path).await,
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, job: &GenerationJob) -> StoreResult<()> {
        self.replace(GENERATIONS, job.id.as_str(), job).await
    }

    async fn update_if_status(&self, job: &GenerationJob, expected: JobStatus) -> StoreResult<bool> {
        self.replace_generation_if(job, expected).await
    }

    async fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<GenerationJob>> {
        let mut jobs: Vec<GenerationJob> = self
            .scan::<GenerationJob>(GENERATIONS)
            .await?
            .into_iter()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl MergeStore for FileStore {
    async fn create(&self, job: &MergeJob) -> StoreResult<()> {
        self.insert(MERGES, job.id.as_str(), job).await
    }

    async fn get(&self, id: &MergeId) -> StoreResult<Option<MergeJob>> {
        match self.record_path(MERGES, id.as_str()) {
            Ok(path) => self.read(&path).await,
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, job: &MergeJob) -> StoreResult<()> {
        self.replace(MERGES, job.id.as_str(), job).await
    }

    async fn list(&self) -> StoreResult<Vec<MergeJob>> {
        let mut jobs = self.scan::<MergeJob>(MERGES).await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl AggregateSink for FileStore {
    async fn storyboard_video_ready(
        &self,
        storyboard_id: &str,
        video_path: &str,
        duration: f64,
    ) -> StoreResult<()> {
        let row = StoryboardVideo {
            storyboard_id: storyboard_id.to_string(),
            video_path: video_path.to_string(),
            duration,
            updated_at: Utc::now(),
        };
        self.upsert(STORYBOARDS, storyboard_id, &row).await
    }

    async fn episode_merge_completed(&self, episode_id: &str, job: &MergeJob) -> StoreResult<()> {
        let row = EpisodeVideo::from_merge(episode_id, job);
        self.upsert(EPISODES, episode_id, &row).await
    }
}
