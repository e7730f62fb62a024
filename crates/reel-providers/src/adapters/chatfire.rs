//! Chatfire aggregator adapter.
//!
//! The request body depends on the model family: doubao/seedance models take a
//! content array with prompt flags, sora models take seconds/size, everything
//! else takes a flat body.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use super::{first_reference, prompt_with_flags, seedance_content, ContentPart};
use crate::error::{ProviderError, ProviderResult};
use crate::http::ProviderHttp;
use crate::provider::{
    error_message, first_str, is_failure_status, number_at, query_path, PollOutcome, Submission,
    VideoProvider,
};
use crate::settings::ProviderSettings;

pub const NAME: &str = "chatfire";
pub const DEFAULT_BASE_URL: &str = "https://api.chatfire.site/v1";
const DEFAULT_MODEL: &str = "doubao-seedance-1-0-lite-i2v-250428";
const DEFAULT_ENDPOINT: &str = "/video/generations";
const DEFAULT_QUERY_ENDPOINT: &str = "/video/task/{taskId}";
const DEFAULT_DURATION: u32 = 5;
const DEFAULT_RATIO: &str = "16:9";

const MODES: &[ReferenceMode] = &[
    ReferenceMode::None,
    ReferenceMode::Single,
    ReferenceMode::FirstLast,
    ReferenceMode::Multiple,
];

#[derive(Debug, Serialize)]
struct SeedanceBody {
    model: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
struct SoraBody {
    model: String,
    prompt: String,
    seconds: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_reference: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlainBody {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    duration: u32,
    size: String,
}

/// Sora-style size for an aspect ratio.
pub(crate) fn sora_size(aspect_ratio: &str) -> String {
    match aspect_ratio {
        "16:9" => "1280x720".to_string(),
        "9:16" => "720x1280".to_string(),
        other => other.to_string(),
    }
}

/// Chatfire adapter.
#[derive(Debug, Clone)]
pub struct ChatfireProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

impl ChatfireProvider {
    pub fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(NAME, settings.api_key.clone())?,
            settings,
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderSettings::from_env(NAME, DEFAULT_BASE_URL)?)
    }

    fn build_body(
        &self,
        model: &str,
        reference: &ReferenceInput,
        prompt: &str,
        options: &GenerationOptions,
    ) -> ProviderResult<Value> {
        let duration = options.duration.unwrap_or(DEFAULT_DURATION);
        let ratio = options.aspect_ratio.as_deref().unwrap_or(DEFAULT_RATIO);
        let lower = model.to_ascii_lowercase();

        let body = if lower.contains("doubao") || lower.contains("seedance") {
            serde_json::to_value(SeedanceBody {
                model: model.to_string(),
                content: seedance_content(reference, prompt_with_flags(prompt, ratio, duration)),
            })
        } else if lower.contains("sora") {
            serde_json::to_value(SoraBody {
                model: model.to_string(),
                prompt: prompt.to_string(),
                seconds: duration.to_string(),
                size: Some(sora_size(ratio)),
                input_reference: first_reference(reference).map(str::to_string),
            })
        } else {
            serde_json::to_value(PlainBody {
                model: model.to_string(),
                prompt: prompt.to_string(),
                image_url: first_reference(reference).map(str::to_string),
                duration,
                size: ratio.to_string(),
            })
        };
        body.map_err(|e| ProviderError::invalid_response(NAME, e.to_string()))
    }
}

/// Task id and status from a chatfire response; nested `data` wins.
fn parse_task(body: &Value) -> (String, PollOutcome) {
    let task_id = first_str(body, &["/data/id", "/id", "/task_id"]).unwrap_or_default();
    let status = first_str(body, &["/status", "/data/status"]).unwrap_or_default();
    let result_url = first_str(body, &["/video_url", "/data/video_url", "/content/video_url"]);

    let mut error = error_message(body.get("error"));
    if error.is_none() && is_failure_status(&status) {
        error = Some(format!("provider reported status {}", status));
    }

    let status_done = matches!(status.to_ascii_lowercase().as_str(), "completed" | "succeeded");
    let outcome = PollOutcome {
        completed: error.is_none() && (status_done || result_url.is_some()),
        result_url,
        error,
        duration: number_at(body, "/duration").or_else(|| number_at(body, "/data/duration")),
        width: None,
        height: None,
    };
    (task_id, outcome)
}

#[async_trait]
impl VideoProvider for ChatfireProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_modes(&self) -> &'static [ReferenceMode] {
        MODES
    }

    async fn generate(
        &self,
        reference: &ReferenceInput,
        prompt: &str,
        options: &GenerationOptions,
    ) -> ProviderResult<Submission> {
        self.check_mode(reference.mode())?;

        let model = self.settings.model_for(options.model.as_deref(), DEFAULT_MODEL);
        let body = self.build_body(&model, reference, prompt, options)?;
        let endpoint = self.settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        let response = self.http.post_json(&self.settings.url(endpoint), &body).await?;
        let (task_id, outcome) = parse_task(&response);
        if let Some(error) = &outcome.error {
            return Err(ProviderError::rejected(NAME, error.clone()));
        }

        info!(provider = NAME, model = %model, task_id = %task_id, "Generation submitted");
        Ok(Submission::from_response(task_id, outcome))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let template = self
            .settings
            .query_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_QUERY_ENDPOINT);
        let response = self
            .http
            .get_json(&self.settings.url(&query_path(template, task_id)))
            .await?;
        Ok(parse_task(&response).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, model: &str) -> ChatfireProvider {
        ChatfireProvider::new(ProviderSettings::new("sk-chatfire", server.uri()).with_model(model))
            .unwrap()
    }

    #[tokio::test]
    async fn test_seedance_body_and_task_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/generations"))
            .and(header("authorization", "Bearer sk-chatfire"))
            .and(body_json(json!({
                "model": "doubao-seedance-pro",
                "content": [
                    {"type": "text", "text": "a fox  --ratio 9:16  --dur 5"},
                    {"type": "image_url", "image_url": {"url": "https://x/a.png"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "outer", "data": {"id": "inner", "status": "queued"}
            })))
            .mount(&server)
            .await;

        let options = GenerationOptions {
            aspect_ratio: Some("9:16".into()),
            ..Default::default()
        };
        let reference = ReferenceInput::Single {
            image_url: "https://x/a.png".into(),
        };
        let submission = provider(&server, "doubao-seedance-pro")
            .generate(&reference, "a fox", &options)
            .await
            .unwrap();
        assert_eq!(submission, Submission::Task("inner".into()));
    }

    #[tokio::test]
    async fn test_sora_model_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "model": "sora-2",
                "prompt": "waves",
                "seconds": "8",
                "size": "1280x720",
                "input_reference": "https://x/a.png"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-9"})))
            .mount(&server)
            .await;

        let options = GenerationOptions {
            duration: Some(8),
            ..Default::default()
        };
        let reference = ReferenceInput::Single {
            image_url: "https://x/a.png".into(),
        };
        let submission = provider(&server, "sora-2")
            .generate(&reference, "waves", &options)
            .await
            .unwrap();
        assert_eq!(submission, Submission::Task("t-9".into()));
    }

    #[tokio::test]
    async fn test_error_object_rejects_submission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "insufficient quota", "code": "quota"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server, "kling-v1")
            .generate(&ReferenceInput::None, "x", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { ref message, .. } if message == "insufficient quota"));
    }

    #[tokio::test]
    async fn test_poll_reads_nested_video_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video/task/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc", "status": "processing",
                "content": {"video_url": "https://cdn/v.mp4"}
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server, "doubao").poll("abc").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.result(), Some("https://cdn/v.mp4"));
    }

    #[tokio::test]
    async fn test_poll_string_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed", "error": "content moderation"
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server, "doubao").poll("abc").await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.error.as_deref(), Some("content moderation"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = provider(&server, "doubao").poll("abc").await.unwrap_err();
        assert!(err.is_transient());
    }
}
