//! Pika adapter.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use super::first_reference;
use crate::error::{ProviderError, ProviderResult};
use crate::http::ProviderHttp;
use crate::provider::{
    error_message, first_str, is_failure_status, number_at, PollOutcome, Submission,
    VideoProvider,
};
use crate::settings::ProviderSettings;

pub const NAME: &str = "pika";
pub const DEFAULT_BASE_URL: &str = "https://api.pika.art";
const DEFAULT_MODEL: &str = "pika-1.5";
const DEFAULT_DURATION: u32 = 3;
const DEFAULT_RATIO: &str = "16:9";
const DEFAULT_MOTION: u32 = 50;

const MODES: &[ReferenceMode] = &[ReferenceMode::None, ReferenceMode::Single];

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    prompt: &'a str,
    duration: u32,
    aspect_ratio: &'a str,
    motion: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_motion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

/// Pika adapter.
#[derive(Debug, Clone)]
pub struct PikaProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

impl PikaProvider {
    pub fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(NAME, settings.api_key.clone())?,
            settings,
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderSettings::from_env(NAME, DEFAULT_BASE_URL)?)
    }
}

fn parse_job(body: &Value) -> PollOutcome {
    let status = first_str(body, &["/status"]).unwrap_or_default();
    let mut error = error_message(body.get("error"));
    if error.is_none() && is_failure_status(&status) {
        error = Some(format!("provider reported status {}", status));
    }
    PollOutcome {
        completed: error.is_none() && status.eq_ignore_ascii_case("completed"),
        result_url: first_str(body, &["/result/video_url", "/video_url"]),
        error,
        duration: number_at(body, "/result/duration"),
        width: None,
        height: None,
    }
}

#[async_trait]
impl VideoProvider for PikaProvider {
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

        let body = GenerateBody {
            model: self.settings.model_for(options.model.as_deref(), DEFAULT_MODEL),
            image: first_reference(reference),
            prompt,
            duration: options.duration.unwrap_or(DEFAULT_DURATION),
            aspect_ratio: options.aspect_ratio.as_deref().unwrap_or(DEFAULT_RATIO),
            motion: options.motion_level.unwrap_or(DEFAULT_MOTION),
            camera_motion: options.camera_motion.as_deref(),
            seed: options.seed,
        };
        let endpoint = self.settings.endpoint.as_deref().unwrap_or("/v1/video/generate");
        let response = self.http.post_json(&self.settings.url(endpoint), &body).await?;
        if let Some(error) = error_message(response.get("error")) {
            return Err(ProviderError::rejected(NAME, error));
        }

        let task_id = first_str(&response, &["/job_id", "/id"]).unwrap_or_default();
        info!(provider = NAME, model = %body.model, task_id = %task_id, "Generation submitted");
        Ok(Submission::from_response(task_id, parse_job(&response)))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let url = self.settings.url(&format!("/v1/video/status/{}", task_id));
        let response = self.http.get_json(&url).await?;
        Ok(parse_job(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> PikaProvider {
        PikaProvider::new(ProviderSettings::new("pk-key", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_text_only_body_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/video/generate"))
            .and(body_json(json!({
                "model": "pika-1.5",
                "prompt": "a comet",
                "duration": 3,
                "aspect_ratio": "16:9",
                "motion": 50
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "pk-1"})))
            .mount(&server)
            .await;

        let submission = provider(&server)
            .generate(&ReferenceInput::None, "a comet", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(submission, Submission::Task("pk-1".into()));
    }

    #[tokio::test]
    async fn test_multiple_references_unsupported() {
        let server = MockServer::start().await;
        let reference = ReferenceInput::Multiple {
            image_urls: vec!["a".into()],
        };
        let err = provider(&server)
            .generate(&reference, "x", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported mode for provider pika: multiple");
    }

    #[tokio::test]
    async fn test_poll_completed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/video/status/pk-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed", "result": {"video_url": "https://pika/v.mp4", "duration": 3}
            })))
            .mount(&server)
            .await;

        let outcome = provider(&server).poll("pk-1").await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.duration, Some(3.0));
    }
}
