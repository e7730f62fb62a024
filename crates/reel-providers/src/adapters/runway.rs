//! Runway image-to-video adapter.

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

pub const NAME: &str = "runway";
pub const DEFAULT_BASE_URL: &str = "https://api.runwayml.com";
const DEFAULT_MODEL: &str = "gen3a_turbo";
const DEFAULT_DURATION: u32 = 5;
const DEFAULT_RATIO: &str = "16:9";

const MODES: &[ReferenceMode] = &[ReferenceMode::Single];

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: String,
    prompt_image: &'a str,
    prompt_text: &'a str,
    duration: u32,
    aspect_ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

/// Runway adapter.
#[derive(Debug, Clone)]
pub struct RunwayProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

impl RunwayProvider {
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

fn parse_status(body: &Value) -> PollOutcome {
    let status = first_str(body, &["/status"]).unwrap_or_default();
    let mut error = error_message(body.get("error"));
    if error.is_none() && is_failure_status(&status) {
        error = Some(format!("provider reported status {}", status));
    }
    PollOutcome {
        completed: error.is_none() && status.eq_ignore_ascii_case("succeeded"),
        result_url: first_str(body, &["/output/url", "/video_url"]),
        error,
        duration: number_at(body, "/output/duration"),
        width: None,
        height: None,
    }
}

#[async_trait]
impl VideoProvider for RunwayProvider {
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
        let image = first_reference(reference)
            .ok_or_else(|| ProviderError::InvalidReference("runway requires an image".into()))?;

        let body = GenerateBody {
            model: self.settings.model_for(options.model.as_deref(), DEFAULT_MODEL),
            prompt_image: image,
            prompt_text: prompt,
            duration: options.duration.unwrap_or(DEFAULT_DURATION),
            aspect_ratio: options.aspect_ratio.as_deref().unwrap_or(DEFAULT_RATIO),
            seed: options.seed,
        };
        let endpoint = self.settings.endpoint.as_deref().unwrap_or("/v1/video/generate");
        let response = self.http.post_json(&self.settings.url(endpoint), &body).await?;
        if let Some(error) = error_message(response.get("error")) {
            return Err(ProviderError::rejected(NAME, error));
        }

        let task_id = first_str(&response, &["/id", "/task_id"]).unwrap_or_default();
        info!(provider = NAME, model = %body.model, task_id = %task_id, "Generation submitted");
        Ok(Submission::from_response(task_id, parse_status(&response)))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let url = self.settings.url(&format!("/v1/video/status/{}", task_id));
        let response = self.http.get_json(&url).await?;
        Ok(parse_status(&response))
    }
}
