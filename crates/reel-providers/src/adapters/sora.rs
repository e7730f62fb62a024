//! OpenAI Sora adapter.
//!
//! Submission is multipart; the reference image travels as a file part, so
//! this adapter asks for every reference to be inlined before the call.

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::info;

use reel_models::{GenerationOptions, ReferenceInput, ReferenceMode};

use super::chatfire::sora_size;
use super::first_reference;
use crate::error::{ProviderError, ProviderResult};
use crate::http::ProviderHttp;
use crate::provider::{
    error_message, first_str, is_failure_status, number_at, PollOutcome, Submission,
    VideoProvider,
};
use crate::settings::ProviderSettings;

pub const NAME: &str = "sora";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "sora-2";
const DEFAULT_SECONDS: u32 = 4;

const MODES: &[ReferenceMode] = &[ReferenceMode::None, ReferenceMode::Single];

/// Sora adapter.
#[derive(Debug, Clone)]
pub struct SoraProvider {
    http: ProviderHttp,
    settings: ProviderSettings,
}

/// Decoded reference image ready for upload.
#[derive(Debug, PartialEq)]
struct ImagePart {
    bytes: Vec<u8>,
    mime: &'static str,
}

impl ImagePart {
    fn file_name(&self) -> String {
        let ext = match self.mime {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        format!("reference.{}", ext)
    }
}

fn mime_from_hint(hint: &str) -> &'static str {
    let hint = hint.to_ascii_lowercase();
    if hint.contains("jpeg") || hint.contains("jpg") {
        "image/jpeg"
    } else if hint.contains("webp") {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Split a `data:` URI into its MIME type and decoded bytes.
fn decode_inline(uri: &str) -> ProviderResult<ImagePart> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ProviderError::InvalidReference("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::InvalidReference("data URI has no payload".to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::InvalidReference(format!("invalid base64 payload: {}", e)))?;
    Ok(ImagePart {
        bytes,
        mime: mime_from_hint(header),
    })
}

impl SoraProvider {
    pub fn new(settings: ProviderSettings) -> ProviderResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(NAME, settings.api_key.clone())?,
            settings,
        })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderSettings::from_env(NAME, DEFAULT_BASE_URL)?)
    }

    async fn load_reference(&self, reference: &str) -> ProviderResult<ImagePart> {
        if reference.starts_with("data:") {
            return decode_inline(reference);
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let bytes = self.http.get_bytes(reference).await?;
            let path = reference.split(['?', '#']).next().unwrap_or(reference);
            return Ok(ImagePart {
                bytes,
                mime: mime_from_hint(path.rsplit('.').next().unwrap_or_default()),
            });
        }
        Err(ProviderError::InvalidReference(format!(
            "reference must be inline or remote: {}",
            reference
        )))
    }
}

fn parse_video(body: &Value) -> PollOutcome {
    let status = first_str(body, &["/status"]).unwrap_or_default();
    let mut error = error_message(body.get("error"));
    if error.is_none() && is_failure_status(&status) {
        error = Some(format!("provider reported status {}", status));
    }
    PollOutcome {
        completed: error.is_none() && status.eq_ignore_ascii_case("completed"),
        result_url: first_str(body, &["/video_url", "/video/url"]),
        error,
        duration: number_at(body, "/seconds"),
        width: None,
        height: None,
    }
}

#[async_trait]
impl VideoProvider for SoraProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_modes(&self) -> &'static [ReferenceMode] {
        MODES
    }

    fn inline_images(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        reference: &ReferenceInput,
        prompt: &str,
        options: &GenerationOptions,
    ) -> ProviderResult<Submission> {
        self.check_mode(reference.mode())?;

        let model = self.settings.model_for(options.model.as_deref(), DEFAULT_MODEL);
        let seconds = options.duration.unwrap_or(DEFAULT_SECONDS);
        let mut form = Form::new()
            .text("model", model.clone())
            .text("prompt", prompt.to_string())
            .text("seconds", seconds.to_string());
        if let Some(ratio) = options.aspect_ratio.as_deref() {
            form = form.text("size", sora_size(ratio));
        }
        if let Some(url) = first_reference(reference) {
            let image = self.load_reference(url).await?;
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name())
                .mime_str(image.mime)
                .map_err(|e| ProviderError::InvalidReference(e.to_string()))?;
            form = form.part("input_reference", part);
        }

        let endpoint = self.settings.endpoint.as_deref().unwrap_or("/videos");
        let response = self.http.post_multipart(&self.settings.url(endpoint), form).await?;
        if let Some(error) = error_message(response.get("error")) {
            return Err(ProviderError::rejected(NAME, error));
        }
        let task_id = first_str(&response, &["/id"]).unwrap_or_default();

        info!(provider = NAME, model = %model, task_id = %task_id, "Generation submitted");
        Ok(Submission::from_response(task_id, parse_video(&response)))
    }

    async fn poll(&self, task_id: &str) -> ProviderResult<PollOutcome> {
        let url = self.settings.url(&format!("/videos/{}", task_id));
        let response = self.http.get_json(&url).await?;
        Ok(parse_video(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> SoraProvider {
        SoraProvider::new(ProviderSettings::new("sk-openai", server.uri())).unwrap()
    }

    #[test]
    fn test_decode_inline_reference() {
        let image = decode_inline("data:image/jpeg;base64,/9j/AA==").unwrap();
        assert_eq!(image.mime, "image/jpeg");
        assert_eq!(image.file_name(), "reference.jpg");
        assert_eq!(image.bytes, vec![0xff, 0xd8, 0xff, 0x00]);

        assert!(decode_inline("data:image/png;base64").is_err());
        assert_eq!(decode_inline("data:;base64,AA==").unwrap().mime, "image/png");
    }

    #[tokio::test]
    async fn test_multipart_submission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/videos"))
            .and(body_string_contains("name=\"input_reference\"; filename=\"reference.png\""))
            .and(body_string_contains("1280x720"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "video_123", "status": "queued"
            })))
            .mount(&server)
            .await;

        let options = GenerationOptions {
            aspect_ratio: Some("16:9".into()),
            ..Default::default()
        };
        let reference = ReferenceInput::Single {
            image_url: "data:image/png;base64,aGVsbG8=".into(),
        };
        let submission = provider(&server)
            .generate(&reference, "a kite", &options)
            .await
            .unwrap();
        assert_eq!(submission, Submission::Task("video_123".into()));
    }

    #[tokio::test]
    async fn test_first_last_is_unsupported() {
        let server = MockServer::start().await;
        let reference = ReferenceInput::FirstLast {
            first_frame_url: "a".into(),
            last_frame_url: "b".into(),
        };
        let err = provider(&server)
            .generate(&reference, "x", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported mode for provider sora: first_last");
        assert!(provider(&server).inline_images());
    }

    #[tokio::test]
    async fn test_poll_completed_and_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/done"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "done", "status": "completed", "video": {"url": "https://oai/v.mp4"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "bad", "status": "failed", "error": {"message": "policy violation"}
            })))
            .mount(&server)
            .await;

        let done = provider(&server).poll("done").await.unwrap();
        assert!(done.completed);
        assert_eq!(done.result(), Some("https://oai/v.mp4"));

        let bad = provider(&server).poll("bad").await.unwrap();
        assert_eq!(bad.error.as_deref(), Some("policy violation"));
    }
}
