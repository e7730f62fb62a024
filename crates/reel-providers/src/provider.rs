//! The capability interface every vendor adapter implements.

use async_trait::async_trait;
use serde_json::Value;

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use crate::error::{ProviderError, ProviderResult};

/// What a provider returned for a generation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Work accepted asynchronously; poll with this id.
    Task(String),
    /// Terminal result returned in the same call.
    Completed(PollOutcome),
}

impl Submission {
    /// Classify a submit response.
    ///
    /// A result URL wins; a terminal status without one yields an empty
    /// completion; everything else is a task, even with an empty id.
    pub fn from_response(task_id: String, outcome: PollOutcome) -> Self {
        if outcome.completed && (outcome.has_result() || task_id.trim().is_empty()) {
            Submission::Completed(outcome)
        } else {
            Submission::Task(task_id)
        }
    }
}

/// Status of an asynchronous provider task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub completed: bool,
    pub result_url: Option<String>,
    /// Provider-side error; terminal when set
    pub error: Option<String>,
    /// Provider-reported duration in seconds, untrusted
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl PollOutcome {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn completed(result_url: impl Into<String>) -> Self {
        Self {
            completed: true,
            result_url: Some(result_url.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration.filter(|d| *d > 0.0);
        self
    }

    /// Non-empty result URL.
    pub fn result(&self) -> Option<&str> {
        self.result_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn has_result(&self) -> bool {
        self.result().is_some()
    }
}

/// Uniform interface over heterogeneous video generation APIs.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Registry name (e.g. "chatfire", "ark").
    fn name(&self) -> &str;

    /// Reference modes this adapter can express.
    fn supported_modes(&self) -> &'static [ReferenceMode];

    fn supports(&self, mode: ReferenceMode) -> bool {
        self.supported_modes().contains(&mode)
    }

    /// Fail fast when the provider cannot express `mode`.
    fn check_mode(&self, mode: ReferenceMode) -> ProviderResult<()> {
        if self.supports(mode) {
            Ok(())
        } else {
            Err(ProviderError::unsupported_mode(self.name(), mode))
        }
    }

    /// Whether every reference must arrive as an inline `data:` URI.
    fn inline_images(&self) -> bool {
        false
    }

    /// Submit a generation.
    async fn generate(
        &self,
        reference: &ReferenceInput,
        prompt: &str,
        options: &GenerationOptions,
    ) -> ProviderResult<Submission>;

    /// Query an asynchronous task.
    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome>;
}

/// Expand a query endpoint template with the task id.
///
/// `{taskId}` and `{task_id}` are substituted; otherwise `/<task_id>` is appended.
pub fn query_path(template: &str, task_id: &str) -> String {
    if template.contains("{taskId}") {
        template.replace("{taskId}", task_id)
    } else if template.contains("{task_id}") {
        template.replace("{task_id}", task_id)
    } else {
        format!("{}/{}", template.trim_end_matches('/'), task_id)
    }
}

/// Error text from a field that may be a string or an object with `message`.
pub fn error_message(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ if map.is_empty() => return None,
            _ => Value::Object(map.clone()).to_string(),
        },
        other => other.to_string(),
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// First non-empty string found at any of the JSON pointers.
pub fn first_str(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p))
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

/// Positive number at a JSON pointer, accepting numeric strings.
pub fn number_at(body: &Value, pointer: &str) -> Option<f64> {
    match body.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite() && *n > 0.0)
}

/// Whether a status string means the provider gave up on the task.
pub fn is_failure_status(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "failed" | "failure" | "error" | "cancelled" | "canceled" | "expired"
    )
}
