//! Generation job manager.
//!
//! `submit` validates and persists a pending job, then hands all provider I/O
//! to a detached task. That task either finalizes a synchronous result or
//! records the provider task id and polls it:
//!
//! ```text
//! pending ──generate──▶ processing ──poll…──▶ completed | failed
//!    └────────── sync result / error ──────▶ completed | failed
//! ```
//!
//! Before every poll the loop re-reads the persisted job and stops as soon as
//! it is no longer `processing`; this is how cancellation reaches it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, warn, Instrument};

use reel_models::{
    is_remote_url, CompletedMedia, GenerationId, GenerationJob, GenerationRequest, JobStatus,
    ReferenceInput,
};
use reel_providers::{PollOutcome, ProviderError, ProviderRegistry, Submission, VideoProvider};
use reel_storage::{FetchedMedia, StorageError, UrlCache, CATEGORY_VIDEOS};
use reel_store::{AggregateSink, GenerationStore};

use crate::active::{ActiveGuard, ActiveSet};
use crate::config::PollingConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::localize::MediaLocalizer;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, FailureTracker, RetryConfig};

/// Error recorded on a job cancelled through [`GenerationManager::cancel`].
pub const CANCELLED_MESSAGE: &str = "cancelled by caller";

/// Error recorded on jobs still `pending` when recovery runs.
pub const SUBMISSION_INTERRUPTED_MESSAGE: &str = "generation interrupted by restart before submission";

/// Consecutive poll failures logged before the rest are suppressed.
const LOGGED_POLL_FAILURES: u32 = 3;

/// Outcome of a crash-recovery scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoverySummary {
    /// Poll loops restarted
    pub resumed: usize,
    /// Jobs without a task id, or already being polled
    pub skipped: usize,
    /// Jobs failed because their provider is gone or submission was interrupted
    pub failed: usize,
}

/// Outcome of a result-migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Completed jobs examined
    pub scanned: usize,
    pub localized: usize,
    pub failed: usize,
}

/// Tracks generation jobs from submission to a terminal status.
#[derive(Clone)]
pub struct GenerationManager {
    store: Arc<dyn GenerationStore>,
    providers: Arc<ProviderRegistry>,
    localizer: Arc<dyn MediaLocalizer>,
    sink: Option<Arc<dyn AggregateSink>>,
    polling: PollingConfig,
    download_retry: RetryConfig,
    /// Jobs with a live background task
    active: ActiveSet<GenerationId>,
}

impl GenerationManager {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        providers: Arc<ProviderRegistry>,
        localizer: Arc<dyn MediaLocalizer>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            store,
            providers,
            localizer,
            sink: None,
            polling,
            download_retry: RetryConfig::new("result_download"),
            active: ActiveSet::default(),
        }
    }

    /// Notify `sink` when a job linked to a storyboard completes.
    pub fn with_sink(mut self, sink: Arc<dyn AggregateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_download_retry(mut self, retry: RetryConfig) -> Self {
        self.download_retry = retry;
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn polling(&self) -> PollingConfig {
        self.polling
    }

    /// Validate and persist a pending job, then start it in the background.
    ///
    /// Shape errors, unknown providers and unsupported reference modes are
    /// rejected here and never create a job.
    pub async fn submit(&self, request: GenerationRequest) -> WorkerResult<GenerationJob> {
        let reference = request.validate_request()?;
        let provider = self.providers.get(&request.provider)?;
        provider.check_mode(reference.mode())?;

        let job = GenerationJob::new(&request, reference);
        // Claimed before it is visible, so recovery never mistakes it for an orphan
        let guard = self.claim(&job.id);
        self.store.create(&job).await?;
        metrics::record_generation_submitted(provider.name());

        let logger = JobLogger::new(&job.id, "generation");
        logger.log_start(&format!(
            "provider={} mode={}",
            provider.name(),
            job.reference_mode()
        ));

        if let Some(guard) = guard {
            let manager = self.clone();
            let id = job.id.clone();
            let span = logger.create_span();
            tokio::spawn(
                async move {
                    let result = manager.execute(&id, provider.as_ref(), &logger).await;
                    manager.settle(&id, provider.name(), result, &logger).await;
                    drop(guard);
                }
                .instrument(span),
            );
        }
        Ok(job)
    }

    pub async fn get(&self, id: &GenerationId) -> WorkerResult<GenerationJob> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::not_found(id.as_str()))
    }

    pub async fn list(&self, status: Option<JobStatus>) -> WorkerResult<Vec<GenerationJob>> {
        Ok(self.store.list(status).await?)
    }

    /// Fail a non-terminal job. Its poll loop notices at the next iteration.
    pub async fn cancel(&self, id: &GenerationId) -> WorkerResult<GenerationJob> {
        let job = self.get(id).await?;
        if job.is_terminal() {
            return Err(WorkerError::AlreadyTerminal {
                id: id.to_string(),
                status: job.status.to_string(),
            });
        }
        match self.transition(id, |job| job.fail(CANCELLED_MESSAGE)).await? {
            Some(job) => {
                JobLogger::new(id, "generation").log_progress(CANCELLED_MESSAGE);
                metrics::record_generation_failed(&job.provider);
                Ok(job)
            }
            None => {
                let job = self.get(id).await?;
                Err(WorkerError::AlreadyTerminal {
                    id: id.to_string(),
                    status: job.status.to_string(),
                })
            }
        }
    }

    /// Restart polling for every `processing` job that has a task id, and
    /// fail `pending` jobs whose submission died with the previous process.
    ///
    /// Safe to call repeatedly: terminal jobs are not listed and jobs that
    /// already have a live task are skipped.
    pub async fn recover(&self) -> WorkerResult<RecoverySummary> {
        let mut summary = RecoverySummary::default();

        for job in self.store.list(Some(JobStatus::Pending)).await? {
            let Some(_guard) = self.claim(&job.id) else {
                summary.skipped += 1;
                continue;
            };
            JobLogger::new(&job.id, "recovery").log_warning(SUBMISSION_INTERRUPTED_MESSAGE);
            self.fail_job(&job.id, &job.provider, SUBMISSION_INTERRUPTED_MESSAGE.to_string())
                .await;
            summary.failed += 1;
        }

        for job in self.store.list_processing().await? {
            let logger = JobLogger::new(&job.id, "recovery");
            let task_id = match job.task_id.as_deref().map(str::trim) {
                Some(task_id) if !task_id.is_empty() => task_id.to_string(),
                _ => {
                    logger.log_warning("processing job has no task id, not recoverable");
                    summary.skipped += 1;
                    continue;
                }
            };

            let provider = match self.providers.get(&job.provider) {
                Ok(provider) => provider,
                Err(e) => {
                    logger.log_error(&format!("cannot resume: {}", e));
                    self.fail_job(&job.id, &job.provider, format!("cannot resume: {}", e))
                        .await;
                    summary.failed += 1;
                    continue;
                }
            };

            let Some(guard) = self.claim(&job.id) else {
                debug!(job_id = %job.id, "Poll loop already running");
                summary.skipped += 1;
                continue;
            };

            logger.log_start(&format!("resuming task {}", task_id));
            let manager = self.clone();
            let id = job.id.clone();
            let span = logger.create_span();
            tokio::spawn(
                async move {
                    let result = manager
                        .poll_until_done(&id, provider.as_ref(), &task_id, &logger)
                        .await;
                    manager.settle(&id, provider.name(), result, &logger).await;
                    drop(guard);
                }
                .instrument(span),
            );
            summary.resumed += 1;
        }

        if summary != RecoverySummary::default() {
            tracing::info!(
                resumed = summary.resumed,
                skipped = summary.skipped,
                failed = summary.failed,
                "Generation recovery finished"
            );
        }
        Ok(summary)
    }

    /// Re-localize completed jobs whose local file is gone.
    ///
    /// One URL cache spans the run, so a URL shared by several jobs is
    /// downloaded once. Failures are counted and logged; job status never changes.
    pub async fn migrate_results(&self) -> WorkerResult<MigrationSummary> {
        let cache = UrlCache::new();
        let mut summary = MigrationSummary::default();

        for mut job in self.store.list(Some(JobStatus::Completed)).await? {
            summary.scanned += 1;
            if let Some(path) = job.local_path.as_deref() {
                if self.localizer.file_exists(path).await {
                    continue;
                }
            }
            let Some(url) = job.result_url.clone().filter(|u| is_remote_url(u)) else {
                continue;
            };

            let logger = JobLogger::new(&job.id, "migration");
            match self
                .localizer
                .fetch_and_store(&url, CATEGORY_VIDEOS, Some(&cache))
                .await
            {
                Ok(fetched) => {
                    job.local_path = Some(fetched.relative_path);
                    job.updated_at = Utc::now();
                    self.store.update(&job).await?;
                    metrics::record_result_localized("localized");
                    logger.log_progress("result re-localized");
                    self.notify_storyboard(&job, &logger).await;
                    summary.localized += 1;
                }
                Err(e) => {
                    metrics::record_result_localized("failed");
                    logger.log_warning(&format!("re-localization failed: {}", e));
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn claim(&self, id: &GenerationId) -> Option<ActiveGuard<GenerationId>> {
        self.active.claim(id)
    }

    /// Submit to the provider and drive the job until it settles.
    async fn execute(
        &self,
        id: &GenerationId,
        provider: &dyn VideoProvider,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Pending {
            return Ok(());
        }

        let reference = self
            .prepare_reference(&job.reference, provider.inline_images(), logger)
            .await;

        match provider.generate(&reference, &job.prompt, &job.options).await? {
            Submission::Completed(outcome) => {
                logger.log_progress("provider returned a result synchronously");
                self.finalize(id, provider, &outcome, logger).await
            }
            Submission::Task(task_id) => {
                let task_id = task_id.trim().to_string();
                if task_id.is_empty() {
                    return Err(WorkerError::contract_violation(
                        "provider returned neither a task id nor a result",
                    ));
                }
                let accepted = task_id.clone();
                if self.transition(id, move |job| job.start(accepted)).await?.is_none() {
                    return Ok(());
                }
                logger.log_progress(&format!("task {} accepted", task_id));
                self.poll_until_done(id, provider, &task_id, logger).await
            }
        }
    }

    async fn poll_until_done(
        &self,
        id: &GenerationId,
        provider: &dyn VideoProvider,
        task_id: &str,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let started = Instant::now();
        let mut failures = FailureTracker::new(LOGGED_POLL_FAILURES);

        for attempt in 1..=self.polling.max_attempts {
            tokio::time::sleep(self.polling.interval).await;

            match self.store.get(id).await {
                Ok(Some(job)) if job.status == JobStatus::Processing => {}
                Ok(Some(job)) => {
                    logger.log_progress(&format!("status is {}, polling stopped", job.status));
                    return Ok(());
                }
                Ok(None) => {
                    logger.log_warning("job record disappeared, polling stopped");
                    return Ok(());
                }
                Err(e) => {
                    if failures.record_failure() {
                        logger.log_warning(&format!("could not re-read job: {}", e));
                    }
                    continue;
                }
            }

            let outcome = match provider.poll(task_id).await {
                Ok(outcome) => {
                    failures.record_success();
                    outcome
                }
                Err(e) if !e.is_transient() => {
                    metrics::record_poll_error(provider.name());
                    return Err(e.into());
                }
                Err(e) => {
                    metrics::record_poll_error(provider.name());
                    if failures.record_failure() {
                        warn!(
                            job_id = %id,
                            task_id = %task_id,
                            provider = provider.name(),
                            attempt,
                            error = %e,
                            "Poll failed, retrying next cycle"
                        );
                    }
                    continue;
                }
            };

            if let Some(message) = outcome.error.as_deref() {
                return Err(ProviderError::rejected(provider.name(), message).into());
            }
            if outcome.completed {
                return self.finalize(id, provider, &outcome, logger).await;
            }
            debug!(job_id = %id, task_id = %task_id, attempt, "Task still running");
        }

        Err(WorkerError::Timeout {
            attempts: self.polling.max_attempts,
            elapsed_secs: started.elapsed().as_secs(),
        })
    }

    /// Localize the result, settle the duration and complete the job.
    async fn finalize(
        &self,
        id: &GenerationId,
        provider: &dyn VideoProvider,
        outcome: &PollOutcome,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let url = outcome
            .result()
            .ok_or_else(|| {
                WorkerError::contract_violation("provider reported completion without a result URL")
            })?
            .to_string();

        let localizer = &self.localizer;
        let source = url.as_str();
        let fetched = retry_async(&self.download_retry, StorageError::is_transient, move || {
            localizer.fetch_and_store(source, CATEGORY_VIDEOS, None)
        })
        .await?;

        let duration = self.settle_duration(&fetched, outcome.duration, logger).await?;
        let (width, height) = match (outcome.width, outcome.height) {
            (Some(w), Some(h)) => (Some(w), Some(h)),
            _ => match self.localizer.probe_resolution(&fetched.absolute_path).await {
                Ok((w, h)) => (Some(w), Some(h)),
                Err(e) => {
                    logger.log_warning(&format!("resolution probe failed: {}", e));
                    (outcome.width, outcome.height)
                }
            },
        };

        let media = CompletedMedia {
            result_url: url,
            local_path: fetched.relative_path.clone(),
            duration,
            width,
            height,
        };
        let Some(job) = self.transition(id, move |job| job.complete(media)).await? else {
            logger.log_warning("job settled elsewhere, discarding localized result");
            return Ok(());
        };

        let elapsed = (Utc::now() - job.created_at).num_milliseconds().max(0) as f64 / 1000.0;
        metrics::record_generation_completed(provider.name(), elapsed);
        logger.log_completion(&format!(
            "path={} duration={:.2}s",
            fetched.relative_path, duration
        ));
        self.notify_storyboard(&job, logger).await;
        Ok(())
    }

    /// Probed duration wins; a positive reported one is the fallback.
    async fn settle_duration(
        &self,
        fetched: &FetchedMedia,
        reported: Option<f64>,
        logger: &JobLogger,
    ) -> WorkerResult<f64> {
        let reported = reported.filter(|d| d.is_finite() && *d > 0.0);
        match self.localizer.probe_duration(&fetched.absolute_path).await {
            Ok(probed) if probed > 0.0 => {
                if let Some(reported) = reported {
                    if (reported - probed).abs() > 0.5 {
                        logger.log_progress(&format!(
                            "probed duration {:.2}s overrides reported {:.2}s",
                            probed, reported
                        ));
                    }
                }
                return Ok(probed);
            }
            Ok(probed) => logger.log_warning(&format!("probe returned {:.2}s", probed)),
            Err(e) => logger.log_warning(&format!("duration probe failed: {}", e)),
        }
        reported.ok_or_else(|| {
            WorkerError::contract_violation(format!(
                "could not determine duration of {}",
                fetched.relative_path
            ))
        })
    }

    /// Inline local references, or all of them for providers that need it.
    async fn prepare_reference(
        &self,
        reference: &ReferenceInput,
        inline_all: bool,
        logger: &JobLogger,
    ) -> ReferenceInput {
        let mut prepared = reference.clone();
        for url in prepared.urls_mut() {
            if url.starts_with("data:") {
                continue;
            }
            if !inline_all && !self.localizer.is_local_reference(url) {
                continue;
            }
            match self.localizer.to_inline_encoding(url).await {
                Ok(encoded) => *url = encoded,
                Err(e) => logger.log_warning(&format!(
                    "inline encoding of {} failed, sending as-is: {}",
                    url, e
                )),
            }
        }
        prepared
    }

    async fn notify_storyboard(&self, job: &GenerationJob, logger: &JobLogger) {
        let (Some(sink), Some(storyboard_id), Some(path), Some(duration)) = (
            self.sink.as_ref(),
            job.storyboard_id.as_deref(),
            job.local_path.as_deref(),
            job.duration,
        ) else {
            return;
        };
        if let Err(e) = sink.storyboard_video_ready(storyboard_id, path, duration).await {
            logger.log_warning(&format!("storyboard {} update failed: {}", storyboard_id, e));
        }
    }

    /// Record a failed background run on the job.
    async fn settle(
        &self,
        id: &GenerationId,
        provider: &str,
        result: WorkerResult<()>,
        logger: &JobLogger,
    ) {
        if let Err(e) = result {
            logger.log_error(&e.to_string());
            self.fail_job(id, provider, e.to_string()).await;
        }
    }

    async fn fail_job(&self, id: &GenerationId, provider: &str, message: String) {
        match self.transition(id, move |job| job.fail(message)).await {
            Ok(Some(_)) => metrics::record_generation_failed(provider),
            Ok(None) => {}
            Err(e) => error!(job_id = %id, error = %e, "Failed to record job failure"),
        }
    }

    /// Apply `change` to the persisted job unless it is already terminal.
    ///
    /// The write only lands if the status is unchanged since the read, so a
    /// concurrent cancel is never overwritten by a late completion.
    async fn transition<F>(&self, id: &GenerationId, change: F) -> WorkerResult<Option<GenerationJob>>
    where
        F: FnOnce(&mut GenerationJob) + Send,
    {
        let Some(mut job) = self.store.get(id).await? else {
            return Ok(None);
        };
        if job.is_terminal() {
            return Ok(None);
        }
        let observed = job.status;
        change(&mut job);
        if !self.store.update_if_status(&job, observed).await? {
            debug!(job_id = %id, "Status changed concurrently, transition dropped");
            return Ok(None);
        }
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use reel_models::ReferenceMode;
    use reel_providers::ProviderResult;
    use reel_storage::StorageResult;
    use reel_store::{MemoryStore, StoreResult};

    #[derive(Debug, Clone)]
    enum Submit {
        Task(&'static str),
        Completed(Option<&'static str>),
    }

    #[derive(Debug, Clone)]
    enum Script {
        CompleteOn(u32, &'static str),
        FailOn(u32, &'static str),
        /// Transport errors for the first N polls, then completion
        FlakyThenComplete(u32, &'static str),
        /// A non-transient poll error from the given poll on
        RejectOn(u32, &'static str),
        Never,
    }

    struct FakeProvider {
        modes: &'static [ReferenceMode],
        inline: bool,
        submit: Submit,
        script: Script,
        reported_duration: Option<f64>,
        polls: AtomicU32,
        seen: Mutex<Option<ReferenceInput>>,
    }

    impl FakeProvider {
        fn new(submit: Submit, script: Script) -> Self {
            Self {
                modes: &[ReferenceMode::None, ReferenceMode::Single],
                inline: false,
                submit,
                script,
                reported_duration: Some(0.0),
                polls: AtomicU32::new(0),
                seen: Mutex::new(None),
            }
        }

        fn polls(&self) -> u32 {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VideoProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn supported_modes(&self) -> &'static [ReferenceMode] {
            self.modes
        }

        fn inline_images(&self) -> bool {
            self.inline
        }

        async fn generate(
            &self,
            reference: &ReferenceInput,
            _prompt: &str,
            _options: &reel_models::GenerationOptions,
        ) -> ProviderResult<Submission> {
            *self.seen.lock().unwrap() = Some(reference.clone());
            Ok(match &self.submit {
                Submit::Task(id) => Submission::Task(id.to_string()),
                Submit::Completed(url) => Submission::Completed(PollOutcome {
                    completed: true,
                    result_url: url.map(str::to_string),
                    ..Default::default()
                }),
            })
        }

        async fn poll(&self, _task_id: &str) -> ProviderResult<PollOutcome> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let done = |url: &str| PollOutcome {
                completed: true,
                result_url: Some(url.to_string()),
                duration: self.reported_duration,
                ..Default::default()
            };
            match &self.script {
                Script::CompleteOn(at, url) if n >= *at => Ok(done(*url)),
                Script::FailOn(at, message) if n >= *at => Ok(PollOutcome::failed(*message)),
                Script::FlakyThenComplete(flaky, _) if n <= *flaky => {
                    Err(ProviderError::transport("fake", "connection reset by peer"))
                }
                Script::FlakyThenComplete(_, url) => Ok(done(*url)),
                Script::RejectOn(at, message) if n >= *at => {
                    Err(ProviderError::rejected("fake", *message))
                }
                _ => Ok(PollOutcome::pending()),
            }
        }
    }

    struct FakeLocalizer {
        probed: Option<f64>,
        downloads: AtomicU32,
        existing: Mutex<HashSet<String>>,
    }

    impl FakeLocalizer {
        fn new(probed: Option<f64>) -> Self {
            Self {
                probed,
                downloads: AtomicU32::new(0),
                existing: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl MediaLocalizer for FakeLocalizer {
        async fn fetch_and_store(
            &self,
            url: &str,
            _category: &str,
            cache: Option<&UrlCache>,
        ) -> StorageResult<FetchedMedia> {
            if let Some(hit) = cache.and_then(|c| c.get(url)) {
                return Ok(hit);
            }
            let n = self.downloads.fetch_add(1, Ordering::SeqCst);
            let relative_path = format!("videos/result_{}.mp4", n);
            self.existing.lock().unwrap().insert(relative_path.clone());
            let fetched = FetchedMedia {
                absolute_path: PathBuf::from("/storage").join(&relative_path),
                relative_path,
                byte_size: 1024,
            };
            if let Some(cache) = cache {
                cache.insert(url, fetched.clone());
            }
            Ok(fetched)
        }

        async fn probe_duration(&self, path: &Path) -> StorageResult<f64> {
            self.probed.ok_or_else(|| StorageError::not_found(path.display().to_string()))
        }

        async fn probe_resolution(&self, _path: &Path) -> StorageResult<(u32, u32)> {
            Ok((1280, 720))
        }

        async fn to_inline_encoding(&self, reference: &str) -> StorageResult<String> {
            Ok(format!("data:image/png;base64,{}", reference.len()))
        }

        fn is_local_reference(&self, reference: &str) -> bool {
            !reference.starts_with("http") && !reference.starts_with("data:")
        }

        async fn file_exists(&self, relative_path: &str) -> bool {
            self.existing.lock().unwrap().contains(relative_path)
        }
    }

    struct Harness {
        manager: GenerationManager,
        store: Arc<MemoryStore>,
        provider: Arc<FakeProvider>,
        localizer: Arc<FakeLocalizer>,
    }

    fn harness_with(provider: FakeProvider, localizer: FakeLocalizer, max_attempts: u32) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let localizer = Arc::new(localizer);
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let manager = GenerationManager::new(
            store.clone(),
            Arc::new(registry),
            localizer.clone(),
            PollingConfig::new(Duration::from_millis(5), max_attempts),
        )
        .with_sink(store.clone())
        .with_download_retry(RetryConfig::new("test").with_max_retries(0));
        Harness {
            manager,
            store,
            provider,
            localizer,
        }
    }

    fn harness(provider: FakeProvider) -> Harness {
        harness_with(provider, FakeLocalizer::new(Some(5.2)), 50)
    }

    fn single_request() -> GenerationRequest {
        GenerationRequest::new("fake", "a paper boat").with_image("https://x/ref.png")
    }

    async fn wait_terminal(manager: &GenerationManager, id: &GenerationId) -> GenerationJob {
        for _ in 0..400 {
            let job = manager.get(id).await.unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never settled", id);
    }

    #[tokio::test]
    async fn test_completes_on_third_poll_with_probed_duration() {
        let h = harness(FakeProvider::new(
            Submit::Task("abc"),
            Script::CompleteOn(3, "https://x/v.mp4"),
        ));

        let job = h
            .manager
            .submit(single_request().with_mode(ReferenceMode::Single))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.task_id.as_deref(), Some("abc"));
        assert_eq!(done.result_url.as_deref(), Some("https://x/v.mp4"));
        assert_eq!(done.local_path.as_deref(), Some("videos/result_0.mp4"));
        assert_eq!(done.duration, Some(5.2));
        assert_eq!((done.width, done.height), (Some(1280), Some(720)));
        assert_eq!(h.provider.polls(), 3);
    }

    #[tokio::test]
    async fn test_completion_without_url_fails() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::CompleteOn(1, "  ")));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("without a result URL"));
        assert!(done.local_path.is_none());
    }

    #[tokio::test]
    async fn test_synchronous_completion_without_url_fails() {
        let h = harness(FakeProvider::new(Submit::Completed(None), Script::Never));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(h.provider.polls(), 0);
    }

    #[tokio::test]
    async fn test_synchronous_completion_is_localized() {
        let h = harness(FakeProvider::new(
            Submit::Completed(Some("https://x/sync.mp4")),
            Script::Never,
        ));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.task_id.is_none());
        assert_eq!(done.duration, Some(5.2));
    }

    #[tokio::test]
    async fn test_empty_task_id_fails() {
        let h = harness(FakeProvider::new(Submit::Task(" "), Script::Never));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("neither a task id"));
    }

    #[tokio::test]
    async fn test_provider_error_fails_immediately() {
        let h = harness(FakeProvider::new(
            Submit::Task("abc"),
            Script::FailOn(2, "content policy violation"),
        ));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("content policy violation"));
        assert_eq!(h.provider.polls(), 2);
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_ridden_out() {
        let h = harness(FakeProvider::new(
            Submit::Task("abc"),
            Script::FlakyThenComplete(2, "https://x/v.mp4"),
        ));
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.error_message.is_none());
        assert_eq!(h.provider.polls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_poll_fails_without_exhausting_budget() {
        let h = harness_with(
            FakeProvider::new(
                Submit::Task("abc"),
                Script::RejectOn(2, "task not found (code 1004)"),
            ),
            FakeLocalizer::new(Some(5.0)),
            40,
        );
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        let message = done.error_message.unwrap();
        assert!(message.contains("task not found (code 1004)"), "{}", message);
        assert!(!message.contains("timed out"));
        assert_eq!(h.provider.polls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_budget_times_out() {
        let h = harness_with(
            FakeProvider::new(Submit::Task("abc"), Script::Never),
            FakeLocalizer::new(Some(5.0)),
            3,
        );
        let job = h.manager.submit(single_request()).await.unwrap();

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done
            .error_message
            .unwrap()
            .starts_with("Generation timed out after 3 polling attempts"));
        assert_eq!(h.provider.polls(), 3);
    }

    #[tokio::test]
    async fn test_reported_duration_is_fallback_only() {
        let mut provider = FakeProvider::new(Submit::Task("abc"), Script::CompleteOn(1, "https://x/v.mp4"));
        provider.reported_duration = Some(4.0);
        let h = harness_with(provider, FakeLocalizer::new(None), 10);
        let job = h.manager.submit(single_request()).await.unwrap();
        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.duration, Some(4.0));

        let h = harness_with(
            FakeProvider::new(Submit::Task("abc"), Script::CompleteOn(1, "https://x/v.mp4")),
            FakeLocalizer::new(None),
            10,
        );
        let job = h.manager.submit(single_request()).await.unwrap();
        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("could not determine duration"));
    }

    #[tokio::test]
    async fn test_unsupported_mode_rejected_at_submit() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = GenerationRequest::new("fake", "x").with_frames("a.png", "b.png");

        let err = h.manager.submit(request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported mode for provider fake: first_last"
        );
        assert!(h.manager.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_and_bad_shape_rejected() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        assert!(matches!(
            h.manager.submit(GenerationRequest::new("veo", "x")).await,
            Err(WorkerError::Provider(ProviderError::UnknownProvider(_)))
        ));
        let missing_last = GenerationRequest::new("fake", "x").with_mode(ReferenceMode::FirstLast);
        assert!(matches!(
            h.manager.submit(missing_last).await,
            Err(WorkerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let job = h.manager.submit(single_request()).await.unwrap();

        while h.manager.get(&job.id).await.unwrap().status != JobStatus::Processing {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let cancelled = h.manager.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_MESSAGE));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = h.provider.polls();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.provider.polls(), settled);
        assert_eq!(
            h.manager.get(&job.id).await.unwrap().error_message.as_deref(),
            Some(CANCELLED_MESSAGE)
        );
        assert!(matches!(
            h.manager.cancel(&job.id).await,
            Err(WorkerError::AlreadyTerminal { .. })
        ));
    }

    /// Lands a cancel between the manager's read and its completion write.
    struct CancelRacingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl GenerationStore for CancelRacingStore {
        async fn create(&self, job: &GenerationJob) -> StoreResult<()> {
            GenerationStore::create(&self.inner, job).await
        }

        async fn get(&self, id: &GenerationId) -> StoreResult<Option<GenerationJob>> {
            GenerationStore::get(&self.inner, id).await
        }

        async fn update(&self, job: &GenerationJob) -> StoreResult<()> {
            GenerationStore::update(&self.inner, job).await
        }

        async fn update_if_status(
            &self,
            job: &GenerationJob,
            expected: JobStatus,
        ) -> StoreResult<bool> {
            if job.status == JobStatus::Completed {
                if let Some(mut current) = GenerationStore::get(&self.inner, &job.id).await? {
                    current.fail(CANCELLED_MESSAGE);
                    GenerationStore::update(&self.inner, &current).await?;
                }
            }
            self.inner.update_if_status(job, expected).await
        }

        async fn list(&self, status: Option<JobStatus>) -> StoreResult<Vec<GenerationJob>> {
            GenerationStore::list(&self.inner, status).await
        }
    }

    #[tokio::test]
    async fn test_late_completion_does_not_overwrite_cancel() {
        let store = Arc::new(CancelRacingStore {
            inner: MemoryStore::new(),
        });
        let sink = Arc::new(MemoryStore::new());
        let provider = Arc::new(FakeProvider::new(
            Submit::Task("abc"),
            Script::CompleteOn(1, "https://x/v.mp4"),
        ));
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let manager = GenerationManager::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(FakeLocalizer::new(Some(5.2))),
            PollingConfig::new(Duration::from_millis(5), 20),
        )
        .with_sink(sink.clone())
        .with_download_retry(RetryConfig::new("test").with_max_retries(0));

        let mut request = single_request();
        request.storyboard_id = Some("sb-9".into());
        let job = manager.submit(request).await.unwrap();

        let done = wait_terminal(&manager, &job.id).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let done = manager.get(&done.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(done.local_path.is_none());
        assert!(sink.storyboard("sb-9").await.is_none());
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let h = harness(FakeProvider::new(
            Submit::Task("unused"),
            Script::CompleteOn(1, "https://x/v.mp4"),
        ));
        let request = single_request();
        let mut job = GenerationJob::new(&request, request.validate_request().unwrap());
        job.start("abc");
        GenerationStore::create(h.store.as_ref(), &job).await.unwrap();

        let first = h.manager.recover().await.unwrap();
        let second = h.manager.recover().await.unwrap();
        assert_eq!(first.resumed, 1);
        assert_eq!(second.resumed, 0);

        let done = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        let polls = h.provider.polls();
        assert_eq!(polls, 1);

        let third = h.manager.recover().await.unwrap();
        assert_eq!(third, RecoverySummary::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.provider.polls(), polls);
    }

    #[tokio::test]
    async fn test_recovery_fails_orphaned_pending_jobs() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = single_request();
        let orphan = GenerationJob::new(&request, request.validate_request().unwrap());
        GenerationStore::create(h.store.as_ref(), &orphan).await.unwrap();

        let summary = h.manager.recover().await.unwrap();
        assert_eq!(summary.failed, 1);
        let job = h.manager.get(&orphan.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some(SUBMISSION_INTERRUPTED_MESSAGE)
        );
        assert_eq!(h.provider.polls(), 0);
        assert_eq!(h.manager.recover().await.unwrap(), RecoverySummary::default());
    }

    #[tokio::test]
    async fn test_recovery_leaves_live_submissions_alone() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = single_request();
        let live = GenerationJob::new(&request, request.validate_request().unwrap());
        let _guard = h.manager.claim(&live.id).unwrap();
        GenerationStore::create(h.store.as_ref(), &live).await.unwrap();

        let summary = h.manager.recover().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.manager.get(&live.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_recovery_skips_missing_task_id() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = single_request();
        let mut job = GenerationJob::new(&request, request.validate_request().unwrap());
        job.start("");
        GenerationStore::create(h.store.as_ref(), &job).await.unwrap();

        let summary = h.manager.recover().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.manager.get(&job.id).await.unwrap().status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_storyboard_notified_on_completion() {
        let h = harness(FakeProvider::new(
            Submit::Task("abc"),
            Script::CompleteOn(1, "https://x/v.mp4"),
        ));
        let mut request = single_request();
        request.storyboard_id = Some("sb-42".into());
        let job = h.manager.submit(request).await.unwrap();
        wait_terminal(&h.manager, &job.id).await;

        let row = h.store.storyboard("sb-42").await.unwrap();
        assert_eq!(row.video_path, "videos/result_0.mp4");
        assert_eq!(row.duration, 5.2);
    }

    #[tokio::test]
    async fn test_local_references_are_inlined() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = GenerationRequest::new("fake", "x").with_image("images/local.png");
        h.manager.submit(request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = h.provider.seen.lock().unwrap().clone().unwrap();
        assert!(seen.urls()[0].starts_with("data:"));

        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        h.manager.submit(single_request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = h.provider.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.urls(), vec!["https://x/ref.png"]);

        let mut inline = FakeProvider::new(Submit::Task("abc"), Script::Never);
        inline.inline = true;
        let h = harness(inline);
        h.manager.submit(single_request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = h.provider.seen.lock().unwrap().clone().unwrap();
        assert!(seen.urls()[0].starts_with("data:"));
    }

    #[tokio::test]
    async fn test_migrate_results_shares_downloads() {
        let h = harness(FakeProvider::new(Submit::Task("abc"), Script::Never));
        let request = single_request();
        for _ in 0..2 {
            let mut job = GenerationJob::new(&request, request.validate_request().unwrap());
            job.complete(CompletedMedia {
                result_url: "https://x/shared.mp4".into(),
                local_path: "videos/gone.mp4".into(),
                duration: 5.0,
                width: None,
                height: None,
            });
            GenerationStore::create(h.store.as_ref(), &job).await.unwrap();
        }

        let summary = h.manager.migrate_results().await.unwrap();
        assert_eq!(
            summary,
            MigrationSummary {
                scanned: 2,
                localized: 2,
                failed: 0
            }
        );
        assert_eq!(h.localizer.downloads.load(Ordering::SeqCst), 1);

        let again = h.manager.migrate_results().await.unwrap();
        assert_eq!(again.localized, 0);
        for job in h.manager.list(Some(JobStatus::Completed)).await.unwrap() {
            assert_eq!(job.local_path.as_deref(), Some("videos/result_0.mp4"));
        }
    }
}
