//! Generation job records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::request::{GenerationOptions, GenerationRequest, ReferenceInput, ReferenceMode};
use crate::status::JobStatus;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct GenerationId(pub String);

impl GenerationId {
    /// Generate a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GenerationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Localized result of a finished generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedMedia {
    /// Provider-hosted URL
    pub result_url: String,
    /// Storage-relative path of the localized file
    pub local_path: String,
    /// Duration in seconds
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One tracked video generation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    pub id: GenerationId,

    /// Provider name as submitted
    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub prompt: String,

    /// Reference payload; the mode is carried by the enum tag
    #[serde(default)]
    pub reference: ReferenceInput,

    #[serde(default)]
    pub options: GenerationOptions,

    /// External task id, set once the provider accepts async work
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Storage-relative path after localization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storyboard_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub drama_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_gen_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a pending job from a validated request.
    pub fn new(request: &GenerationRequest, reference: ReferenceInput) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::new(),
            provider: request.provider.trim().to_string(),
            model: request.options().model,
            prompt: request.prompt.clone(),
            reference,
            options: request.options(),
            task_id: None,
            status: JobStatus::Pending,
            result_url: None,
            local_path: None,
            duration: None,
            width: None,
            height: None,
            error_message: None,
            storyboard_id: request.storyboard_id.clone(),
            drama_id: request.drama_id.clone(),
            image_gen_id: request.image_gen_id.clone(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn reference_mode(&self) -> ReferenceMode {
        self.reference.mode()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// A processing job with a task id can be resumed by a fresh polling loop.
    pub fn is_recoverable(&self) -> bool {
        self.status == JobStatus::Processing
            && self.task_id.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Record the provider task id and move to processing.
    pub fn start(&mut self, task_id: impl Into<String>) {
        self.task_id = Some(task_id.into());
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    /// Mark the job completed with its localized media.
    pub fn complete(&mut self, media: CompletedMedia) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.result_url = Some(media.result_url);
        self.local_path = Some(media.local_path);
        self.duration = Some(media.duration);
        self.width = media.width.or(self.width);
        self.height = media.height.or(self.height);
        self.error_message = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Mark the job failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        let mut message = error.into();
        if message.trim().is_empty() {
            message = "generation failed".to_string();
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.local_path = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job() -> GenerationJob {
        let request = GenerationRequest::new("chatfire", "a lighthouse at dusk")
            .with_image("https://cdn.example.com/a.png");
        let reference = request.validate_request().unwrap();
        GenerationJob::new(&request, reference)
    }

    #[test]
    fn test_job_creation() {
        let job = pending_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.reference_mode(), ReferenceMode::Single);
        assert!(job.task_id.is_none());
        assert!(!job.is_recoverable());
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = pending_job();

        job.start("abc");
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.is_recoverable());

        job.complete(CompletedMedia {
            result_url: "https://x/v.mp4".into(),
            local_path: "videos/v.mp4".into(),
            duration: 5.2,
            width: Some(1280),
            height: None,
        });
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.local_path.as_deref(), Some("videos/v.mp4"));
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_processing_without_task_id_is_not_recoverable() {
        let mut job = pending_job();
        job.start("  ");
        assert!(!job.is_recoverable());
    }

    #[test]
    fn test_fail_always_has_message() {
        let mut job = pending_job();
        job.fail("");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!job.error_message.unwrap().is_empty());
    }

    #[test]
    fn test_job_roundtrips_through_json() {
        let job = pending_job();
        let json = serde_json::to_string(&job).unwrap();
        let back: GenerationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.reference, job.reference);
    }
}
