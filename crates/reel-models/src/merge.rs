//! Merge requests, clip definitions and merge jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::request::is_remote_url;
use crate::status::JobStatus;

/// Crossfade length used when a transition does not declare one.
pub const DEFAULT_TRANSITION_SECONDS: f64 = 1.0;

/// Unique identifier for a merge job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct MergeId(pub String);

impl MergeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MergeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MergeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transition into the next clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Transition {
    /// Transition name (e.g. "fade", "wipeleft"); "none" or absent is a hard cut
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Transition length in seconds
    #[serde(default, alias = "duration_seconds", skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Transition {
    pub fn new(kind: impl Into<String>, duration: f64) -> Self {
        Self {
            kind: Some(kind.into()),
            duration: Some(duration),
        }
    }

    /// A hard cut.
    pub fn none() -> Self {
        Self {
            kind: Some("none".to_string()),
            duration: None,
        }
    }

    /// Whether this transition is a hard cut.
    pub fn is_cut(&self) -> bool {
        match self.kind.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(kind) => kind.eq_ignore_ascii_case("none"),
        }
    }

    /// Crossfade length: 0.0 for cuts, the declared length, or the default.
    pub fn seconds(&self) -> f64 {
        if self.is_cut() {
            return 0.0;
        }
        match self.duration {
            Some(d) if d > 0.0 => d,
            _ => DEFAULT_TRANSITION_SECONDS,
        }
    }
}

/// One element of a compositor request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, JsonSchema)]
pub struct ClipSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,

    /// Local (storage-relative or absolute) path, or a remote URL
    #[serde(alias = "video_url")]
    #[validate(length(min = 1))]
    pub source: String,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub start_time: f64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub end_time: f64,

    /// Declared duration in seconds, authoritative for offset math
    #[validate(range(min = 0.0))]
    pub duration: f64,

    /// Explicit ordering key
    pub order: i32,

    /// Transition into the next clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
}

impl ClipSpec {
    pub fn new(source: impl Into<String>, duration: f64, order: i32) -> Self {
        Self {
            scene_id: None,
            source: source.into(),
            start_time: 0.0,
            end_time: 0.0,
            duration,
            order,
            transition: None,
        }
    }

    pub fn with_trim(mut self, start: f64, end: f64) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Whether `[start_time, end_time]` selects a sub-range rather than the whole clip.
    pub fn has_trim_window(&self) -> bool {
        self.end_time > 0.0 && self.end_time > self.start_time
    }

    /// Duration after trimming, using the declared duration for whole clips.
    pub fn effective_duration(&self) -> f64 {
        if self.has_trim_window() {
            self.end_time - self.start_time
        } else {
            self.duration
        }
    }

    /// Crossfade length into the next clip; 0.0 when absent or a cut.
    pub fn transition_seconds(&self) -> f64 {
        self.transition.as_ref().map(Transition::seconds).unwrap_or(0.0)
    }

    /// Whether this clip declares a non-cut transition.
    pub fn has_transition(&self) -> bool {
        self.transition.as_ref().is_some_and(|t| !t.is_cut())
    }

    pub fn is_remote(&self) -> bool {
        is_remote_url(&self.source)
    }
}

/// A request to merge clips into one file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct MergeRequest {
    /// Parent aggregate updated on completion
    #[serde(default)]
    pub episode_id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[validate(nested)]
    pub clips: Vec<ClipSpec>,
}

impl MergeRequest {
    pub fn new(clips: Vec<ClipSpec>) -> Self {
        Self {
            clips,
            ..Default::default()
        }
    }

    /// Validate clip fields and order uniqueness.
    pub fn validate_request(&self) -> ModelResult<()> {
        if self.clips.is_empty() {
            return Err(ModelError::EmptyClips);
        }
        self.validate()?;

        let mut seen = HashSet::with_capacity(self.clips.len());
        for clip in &self.clips {
            if clip.source.trim().is_empty() {
                return Err(ModelError::validation(format!(
                    "clip with order {} has no source",
                    clip.order
                )));
            }
            if !seen.insert(clip.order) {
                return Err(ModelError::DuplicateClipOrder(clip.order));
            }
        }
        Ok(())
    }
}

/// Aggregates one compositor run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MergeJob {
    pub id: MergeId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Clips as submitted
    pub clips: Vec<ClipSpec>,

    #[serde(default)]
    pub status: JobStatus,

    /// Storage-relative path of the merged file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MergeJob {
    pub fn new(request: MergeRequest) -> Self {
        let now = Utc::now();
        Self {
            id: MergeId::new(),
            episode_id: request.episode_id,
            title: request.title,
            clips: request.clips,
            status: JobStatus::Pending,
            output_path: None,
            total_duration: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Clips sorted by their ordering key.
    pub fn ordered_clips(&self) -> Vec<ClipSpec> {
        let mut clips = self.clips.clone();
        clips.sort_by_key(|c| c.order);
        clips
    }

    /// Sum of effective clip durations.
    pub fn declared_duration(&self) -> f64 {
        self.clips.iter().map(ClipSpec::effective_duration).sum()
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, output_path: impl Into<String>, total_duration: f64) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.output_path = Some(output_path.into());
        self.total_duration = Some(total_duration);
        self.error_message = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        let mut message = error.into();
        if message.trim().is_empty() {
            message = "merge failed".to_string();
        }
        self.status = JobStatus::Failed;
        self.output_path = None;
        self.error_message = Some(message);
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_seconds() {
        assert_eq!(Transition::new("fade", 1.5).seconds(), 1.5);
        assert_eq!(Transition::new("wipeleft", 0.0).seconds(), DEFAULT_TRANSITION_SECONDS);
        assert_eq!(Transition::none().seconds(), 0.0);
        assert_eq!(Transition::new("NONE", 2.0).seconds(), 0.0);
        assert_eq!(Transition::default().seconds(), 0.0);
    }

    #[test]
    fn test_effective_duration() {
        let whole = ClipSpec::new("a.mp4", 10.0, 0);
        assert_eq!(whole.effective_duration(), 10.0);

        let trimmed = ClipSpec::new("a.mp4", 10.0, 0).with_trim(2.0, 7.0);
        assert!(trimmed.has_trim_window());
        assert_eq!(trimmed.effective_duration(), 5.0);

        let degenerate = ClipSpec::new("a.mp4", 10.0, 0).with_trim(7.0, 2.0);
        assert!(!degenerate.has_trim_window());
        assert_eq!(degenerate.effective_duration(), 10.0);
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let request = MergeRequest::new(vec![
            ClipSpec::new("a.mp4", 5.0, 1),
            ClipSpec::new("b.mp4", 5.0, 1),
        ]);
        assert_eq!(
            request.validate_request(),
            Err(ModelError::DuplicateClipOrder(1))
        );
    }

    #[test]
    fn test_empty_merge_rejected() {
        assert_eq!(
            MergeRequest::new(Vec::new()).validate_request(),
            Err(ModelError::EmptyClips)
        );
    }

    #[test]
    fn test_ordered_clips_ignores_submission_order() {
        let job = MergeJob::new(MergeRequest::new(vec![
            ClipSpec::new("second.mp4", 5.0, 1),
            ClipSpec::new("first.mp4", 5.0, 0),
        ]));
        let ordered = job.ordered_clips();
        assert_eq!(ordered[0].source, "first.mp4");
        assert_eq!(ordered[1].source, "second.mp4");
    }

    #[test]
    fn test_clip_spec_accepts_video_url_alias() {
        let json = r#"{"video_url":"https://x/v.mp4","duration":4.0,"order":2,
            "transition":{"type":"fade","duration":0.5}}"#;
        let clip: ClipSpec = serde_json::from_str(json).unwrap();
        assert_eq!(clip.source, "https://x/v.mp4");
        assert!(clip.is_remote());
        assert_eq!(clip.transition_seconds(), 0.5);
    }
}
