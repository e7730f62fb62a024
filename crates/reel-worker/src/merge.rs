//! Merge job orchestration.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, Instrument};

use reel_media::ClipMerger;
use reel_models::{JobStatus, MergeId, MergeJob, MergeRequest};
use reel_storage::{LocalStorage, CATEGORY_MERGED};
use reel_store::{AggregateSink, MergeStore};

use crate::active::ActiveSet;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Error recorded on unfinished merges found by recovery.
pub const INTERRUPTED_MESSAGE: &str = "merge interrupted by restart";

/// Runs merge jobs in the background and records their outcome.
#[derive(Clone)]
pub struct MergeManager {
    store: Arc<dyn MergeStore>,
    merger: Arc<dyn ClipMerger>,
    storage: LocalStorage,
    sink: Option<Arc<dyn AggregateSink>>,
    active: ActiveSet<MergeId>,
}

impl MergeManager {
    pub fn new(store: Arc<dyn MergeStore>, merger: Arc<dyn ClipMerger>, storage: LocalStorage) -> Self {
        Self {
            store,
            merger,
            storage,
            sink: None,
            active: ActiveSet::default(),
        }
    }

    /// Record completed merges on their episode through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn AggregateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate and persist the merge, then run it in the background.
    pub async fn submit(&self, request: MergeRequest) -> WorkerResult<MergeJob> {
        request.validate_request()?;
        let job = MergeJob::new(request);
        let guard = self.active.claim(&job.id);
        self.store.create(&job).await?;

        let logger = JobLogger::new(&job.id, "merge");
        logger.log_start(&format!(
            "{} clips, {:.2}s declared",
            job.clips.len(),
            job.declared_duration()
        ));

        let manager = self.clone();
        let id = job.id.clone();
        let span = logger.create_span();
        tokio::spawn(
            async move {
                manager.run(&id, &logger).await;
                drop(guard);
            }
            .instrument(span),
        );
        Ok(job)
    }

    pub async fn get(&self, id: &MergeId) -> WorkerResult<MergeJob> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    pub async fn list(&self) -> WorkerResult<Vec<MergeJob>> {
        Ok(self.store.list().await?)
    }

    /// Fail unfinished merges that no task in this process owns.
    ///
    /// The compositor keeps no resumable state, so these cannot be continued.
    pub async fn recover(&self) -> WorkerResult<usize> {
        let mut failed = 0;
        for mut job in self.store.list().await? {
            if job.status.is_terminal() {
                continue;
            }
            let Some(_guard) = self.active.claim(&job.id) else {
                continue;
            };
            job.fail(INTERRUPTED_MESSAGE);
            self.store.update(&job).await?;
            JobLogger::new(&job.id, "recovery").log_warning(INTERRUPTED_MESSAGE);
            failed += 1;
        }
        Ok(failed)
    }

    async fn run(&self, id: &MergeId, logger: &JobLogger) {
        let started = Instant::now();
        let Some(mut job) = self.load(id, logger).await else {
            return;
        };

        job.start();
        if let Err(e) = self.store.update(&job).await {
            logger.log_error(&format!("could not mark merge processing: {}", e));
            return;
        }

        match self.compose(&job).await {
            Ok((path, duration)) => {
                job.complete(path, duration);
                logger.log_completion(&format!(
                    "path={} duration={:.2}s",
                    job.output_path.as_deref().unwrap_or_default(),
                    duration
                ));
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                job.fail(e.to_string());
            }
        }

        if let Err(e) = self.store.update(&job).await {
            error!(merge_id = %id, error = %e, "Failed to persist merge outcome");
            return;
        }
        metrics::record_merge(job.status.as_str(), started.elapsed().as_secs_f64());
        if job.status == JobStatus::Completed {
            self.notify_episode(&job).await;
        }
    }

    async fn load(&self, id: &MergeId, logger: &JobLogger) -> Option<MergeJob> {
        match self.store.get(id).await {
            Ok(Some(job)) if job.status == JobStatus::Pending => Some(job),
            Ok(_) => None,
            Err(e) => {
                logger.log_error(&format!("could not load merge: {}", e));
                None
            }
        }
    }

    /// Merge into a fresh slot; returns its relative path and duration.
    async fn compose(&self, job: &MergeJob) -> WorkerResult<(String, f64)> {
        let slot = self
            .storage
            .allocate(CATEGORY_MERGED, Some("merged"), "mp4")
            .await?;
        let output = self
            .merger
            .merge(&job.ordered_clips(), &slot.absolute_path)
            .await?;
        Ok((slot.relative_path, output.total_duration))
    }

    async fn notify_episode(&self, job: &MergeJob) {
        let (Some(sink), Some(episode_id)) = (self.sink.as_ref(), job.episode_id.as_deref()) else {
            return;
        };
        if let Err(e) = sink.episode_merge_completed(episode_id, job).await {
            error!(merge_id = %job.id, episode_id, error = %e, "Episode update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reel_media::{MediaError, MediaResult, MergeOutput};
    use reel_models::ClipSpec;
    use reel_store::MemoryStore;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMerger {
        sources: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ClipMerger for RecordingMerger {
        async fn merge(&self, clips: &[ClipSpec], output: &Path) -> MediaResult<MergeOutput> {
            *self.sources.lock().unwrap() = clips.iter().map(|c| c.source.clone()).collect();
            if self.fail {
                return Err(MediaError::invalid_input("clip 2 is unreadable"));
            }
            tokio::fs::write(output, b"merged").await?;
            Ok(MergeOutput {
                path: output.to_path_buf(),
                total_duration: clips.iter().map(ClipSpec::effective_duration).sum(),
            })
        }
    }

    struct Harness {
        _dir: TempDir,
        manager: MergeManager,
        store: Arc<MemoryStore>,
        merger: Arc<RecordingMerger>,
    }

    fn harness(fail: bool) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost:8000/static").unwrap();
        let store = Arc::new(MemoryStore::new());
        let merger = Arc::new(RecordingMerger {
            fail,
            ..Default::default()
        });
        let manager = MergeManager::new(store.clone(), merger.clone(), storage).with_sink(store.clone());
        Harness {
            _dir: dir,
            manager,
            store,
            merger,
        }
    }

    fn request() -> MergeRequest {
        let mut request = MergeRequest::new(vec![
            ClipSpec::new("videos/c.mp4", 3.0, 3),
            ClipSpec::new("videos/a.mp4", 5.0, 1),
            ClipSpec::new("videos/b.mp4", 4.0, 2).with_trim(1.0, 3.0),
        ]);
        request.episode_id = Some("ep-7".into());
        request
    }

    async fn wait_terminal(manager: &MergeManager, id: &MergeId) -> MergeJob {
        for _ in 0..400 {
            let job = manager.get(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("merge {} never settled", id);
    }

    #[tokio::test]
    async fn test_merge_follows_order_and_updates_episode() {
        let h = harness(false);
        let job = h.manager.submit(request()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.total_duration, Some(10.0));
        let output = done.output_path.clone().unwrap();
        assert!(output.starts_with("videos/merged/merged_"));
        assert!(output.ends_with(".mp4"));
        assert_eq!(
            *h.merger.sources.lock().unwrap(),
            vec!["videos/a.mp4", "videos/b.mp4", "videos/c.mp4"]
        );

        let episode = h.store.episode("ep-7").await.unwrap();
        assert_eq!(episode.merge_id, done.id);
        assert_eq!(episode.video_path, output);
        assert_eq!(episode.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_compositor_failure_fails_job() {
        let h = harness(true);
        let job = h.manager.submit(request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("clip 2 is unreadable"));
        assert!(done.output_path.is_none());
        assert!(h.store.episode("ep-7").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let h = harness(false);
        assert!(matches!(
            h.manager.submit(MergeRequest::new(vec![])).await,
            Err(WorkerError::Validation(_))
        ));
        let duplicate = MergeRequest::new(vec![
            ClipSpec::new("videos/a.mp4", 5.0, 1),
            ClipSpec::new("videos/b.mp4", 5.0, 1),
        ]);
        assert!(matches!(
            h.manager.submit(duplicate).await,
            Err(WorkerError::Validation(_))
        ));
        assert!(h.manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_fails_interrupted_merges() {
        let h = harness(false);
        let mut job = MergeJob::new(request());
        job.start();
        MergeStore::create(h.store.as_ref(), &job).await.unwrap();

        assert_eq!(h.manager.recover().await.unwrap(), 1);
        let job = h.manager.get(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(h.manager.recover().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recover_fails_merges_that_never_started() {
        let h = harness(false);
        let orphan = MergeJob::new(request());
        MergeStore::create(h.store.as_ref(), &orphan).await.unwrap();

        assert_eq!(h.manager.recover().await.unwrap(), 1);
        let job = h.manager.get(&orphan.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert!(h.merger.sources.lock().unwrap().is_empty());
        assert!(h.store.episode("ep-7").await.is_none());
    }

    #[tokio::test]
    async fn test_recover_leaves_owned_merges_alone() {
        let h = harness(false);
        let live = MergeJob::new(request());
        let _guard = h.manager.active.claim(&live.id).unwrap();
        MergeStore::create(h.store.as_ref(), &live).await.unwrap();

        assert_eq!(h.manager.recover().await.unwrap(), 0);
        assert_eq!(
            h.manager.get(&live.id).await.unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_get_unknown_merge() {
        let h = harness(false);
        assert!(matches!(
            h.manager.get(&MergeId::from_string("nope")).await,
            Err(WorkerError::NotFound(_))
        ));
    }
}
