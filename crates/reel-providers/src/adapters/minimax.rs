//! MiniMax (Hailuo) adapter.
//!
//! Polling happens in two steps: the query endpoint yields a `file_id` once
//! the task succeeds, and the file endpoint turns that into a download URL.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use crate::error::{ProviderError, ProviderResult};
use crate::http::ProviderHttp;
use crate::provider::{first_str, number_at, PollOutcome, Submission, VideoProvider};
use crate::settings::ProviderSettings;

pub const NAME: &str = "minimax";
pub const DEFAULT_BASE_URL: &str = "https://api.minimaxi.com/v1";
const DEFAULT_MODEL: &str = "MiniMax-Hailuo-02";
const DEFAULT_DURATION: u32 = 6;
const DEFAULT_RESOLUTION: &str = "1080P";

const MODES: &[ReferenceMode] = &[
    ReferenceMode::None,
    ReferenceMode::Single,
    ReferenceMode::FirstLast,
    ReferenceMode::Multiple,
];

#[derive(Debug, Serialize)]
struct SubjectReference {
    #[serde(rename = "type")]
    kind: &'static str,
    image: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerationBody {
    model: String,
    prompt: String,
    duration: u32,
    resolution: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subject_reference: Vec<SubjectReference>,
}

impl GenerationBody {
    fn new(model: String, prompt: &str, duration: u32, reference: &ReferenceInput) -> Self {
        let mut body = Self {
            model,
            prompt: prompt.to_string(),
            duration,
            resolution: DEFAULT_RESOLUTION,
            first_frame_image: None,
            last_frame_image: None,
            subject_reference: Vec::new(),
        };
        match reference {
            ReferenceInput::None => {}
            ReferenceInput::Single { image_url } => body.first_frame_image = Some(image_url.clone()),
            ReferenceInput::FirstLast {
                first_frame_url,
                last_frame_url,
            } => {
                body.first_frame_image = Some(first_frame_url.clone());
                body.last_frame_image = Some(last_frame_url.clone());
            }
            ReferenceInput::Multiple { image_urls } => body.subject_reference.push(SubjectReference {
                kind: "character",
                image: image_urls.clone(),
            }),
        }
        body
    }
}

/// Fail when `base_resp.status_code` is non-zero.
fn check_base_resp(body: &Value) -> ProviderResult<()> {
    let code = body
        .pointer("/base_resp/status_code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    let message = first_str(body, &["/base_resp/status_msg"]).unwrap_or_default();
    Err(ProviderError::rejected(NAME, format!("{} (code {})", message, code)))
}

/// MiniMax adapter.
#[derive(Debug, Clone)]
pub struct MinimaxProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

impl MinimaxProvider {
    pub fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(NAME, settings.api_key.clone())?,
            settings,
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderSettings::from_env(NAME, DEFAULT_BASE_URL)?)
    }

    async fn download_url(&self, file_id: &str) -> ProviderResult<Option<String>> {
        let url = self
            .settings
            .url(&format!("/files/retrieve?file_id={}", file_id));
        let body = self.http.get_json(&url).await?;
        check_base_resp(&body)?;
        Ok(first_str(&body, &["/file/download_url"]))
    }
}

#[async_trait]
impl VideoProvider for MinimaxProvider {
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
        let body = GenerationBody::new(model, prompt, duration, reference);

        let endpoint = self.settings.endpoint.as_deref().unwrap_or("/video_generation");
        let response = self.http.post_json(&self.settings.url(endpoint), &body).await?;
        check_base_resp(&response)?;

        let task_id = first_str(&response, &["/task_id"]).unwrap_or_default();
        info!(provider = NAME, model = %body.model, task_id = %task_id, "Generation submitted");
        Ok(Submission::Task(task_id))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let url = self
            .settings
            .url(&format!("/query/video_generation?task_id={}", task_id));
        let body = self.http.get_json(&url).await?;
        check_base_resp(&body)?;

        let status = first_str(&body, &["/status"]).unwrap_or_default();
        match status.as_str() {
            "Success" => {
                let file_id = first_str(&body, &["/file_id"]).unwrap_or_default();
                if file_id.is_empty() {
                    return Ok(PollOutcome::failed("task succeeded without a file_id"));
                }
                debug!(provider = NAME, task_id = %task_id, file_id = %file_id, "Resolving download URL");
                let mut outcome = PollOutcome {
                    completed: true,
                    result_url: self.download_url(&file_id).await?,
                    ..Default::default()
                };
                outcome.width = number_at(&body, "/video_width").map(|w| w as u32);
                outcome.height = number_at(&body, "/video_height").map(|h| h as u32);
                Ok(outcome)
            }
            "Fail" | "Failed" => Ok(PollOutcome::failed(
                first_str(&body, &["/error_message", "/base_resp/status_msg"])
                    .unwrap_or_else(|| format!("provider reported status {}", status)),
            )),
            _ => Ok(PollOutcome::pending()),
        }
    }
}
