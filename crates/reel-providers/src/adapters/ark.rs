//! Volcengine Ark (doubao / seedance) adapter.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use super::{prompt_with_flags, seedance_content, ContentPart};
use crate::error::{ProviderError, ProviderResult};
use crate::http::ProviderHttp;
use crate::provider::{
    error_message, first_str, is_failure_status, number_at, query_path, PollOutcome, Submission,
    VideoProvider,
};
use crate::settings::ProviderSettings;

pub const NAME: &str = "ark";
pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "doubao-seedance-1-0-pro-250528";
const DEFAULT_ENDPOINT: &str = "/contents/generations/tasks";
const DEFAULT_QUERY_ENDPOINT: &str = "/contents/generations/tasks/{taskId}";
const DEFAULT_DURATION: u32 = 5;
const DEFAULT_RATIO: &str = "adaptive";

/// Models that render an audio track when asked.
const AUDIO_MODEL_MARKER: &str = "seedance-1-5-pro";

const MODES: &[ReferenceMode] = &[
    ReferenceMode::None,
    ReferenceMode::Single,
    ReferenceMode::FirstLast,
    ReferenceMode::Multiple,
];

#[derive(Debug, Serialize)]
struct TaskRequest {
    model: String,
    content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    generate_audio: bool,
}

/// Ark adapter.
#[derive(Debug, Clone)]
pub struct ArkProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

impl ArkProvider {
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

fn parse_task(body: &Value) -> PollOutcome {
    let status = first_str(body, &["/status"]).unwrap_or_default();
    let result_url = first_str(body, &["/content/video_url", "/video_url"]);

    let mut error = error_message(body.get("error"));
    if error.is_none() && is_failure_status(&status) {
        error = Some(format!("provider reported status {}", status));
    }

    PollOutcome {
        completed: error.is_none() && status.eq_ignore_ascii_case("succeeded"),
        result_url,
        error,
        duration: number_at(body, "/duration").or_else(|| number_at(body, "/content/duration")),
        width: None,
        height: None,
    }
}

#[async_trait]
impl VideoProvider for ArkProvider {
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
        let duration = options.duration.unwrap_or(DEFAULT_DURATION);
        let ratio = options.aspect_ratio.as_deref().unwrap_or(DEFAULT_RATIO);
        let request = TaskRequest {
            content: seedance_content(reference, prompt_with_flags(prompt, ratio, duration)),
            generate_audio: model.contains(AUDIO_MODEL_MARKER),
            model,
        };

        let endpoint = self.settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let response = self.http.post_json(&self.settings.url(endpoint), &request).await?;

        if let Some(error) = error_message(response.get("error")) {
            return Err(ProviderError::rejected(NAME, error));
        }
        let task_id = first_str(&response, &["/id"]).unwrap_or_default();

        info!(provider = NAME, model = %request.model, task_id = %task_id, "Generation submitted");
        Ok(Submission::from_response(task_id, parse_task(&response)))
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
        Ok(parse_task(&response))
    }
}
