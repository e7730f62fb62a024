//! Generation requests and reference inputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::{ModelError, ModelResult};

/// How many (and which) images seed a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Text-only generation
    #[default]
    None,
    /// One reference image
    Single,
    /// First and last frame images
    FirstLast,
    /// An ordered list of reference images
    Multiple,
}

impl ReferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceMode::None => "none",
            ReferenceMode::Single => "single",
            ReferenceMode::FirstLast => "first_last",
            ReferenceMode::Multiple => "multiple",
        }
    }
}

impl fmt::Display for ReferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference payload matching a [`ReferenceMode`].
///
/// Each entry is a remote URL, a storage-relative path, a `/static/` URL,
/// or an inline `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReferenceInput {
    #[default]
    None,
    Single {
        image_url: String,
    },
    FirstLast {
        first_frame_url: String,
        last_frame_url: String,
    },
    Multiple {
        image_urls: Vec<String>,
    },
}

impl ReferenceInput {
    /// The mode this payload satisfies.
    pub fn mode(&self) -> ReferenceMode {
        match self {
            ReferenceInput::None => ReferenceMode::None,
            ReferenceInput::Single { .. } => ReferenceMode::Single,
            ReferenceInput::FirstLast { .. } => ReferenceMode::FirstLast,
            ReferenceInput::Multiple { .. } => ReferenceMode::Multiple,
        }
    }

    /// All references in payload order.
    pub fn urls(&self) -> Vec<&str> {
        match self {
            ReferenceInput::None => Vec::new(),
            ReferenceInput::Single { image_url } => vec![image_url.as_str()],
            ReferenceInput::FirstLast {
                first_frame_url,
                last_frame_url,
            } => vec![first_frame_url.as_str(), last_frame_url.as_str()],
            ReferenceInput::Multiple { image_urls } => {
                image_urls.iter().map(String::as_str).collect()
            }
        }
    }

    /// Mutable access to every reference, used when rewriting them to inline encodings.
    pub fn urls_mut(&mut self) -> Vec<&mut String> {
        match self {
            ReferenceInput::None => Vec::new(),
            ReferenceInput::Single { image_url } => vec![image_url],
            ReferenceInput::FirstLast {
                first_frame_url,
                last_frame_url,
            } => vec![first_frame_url, last_frame_url],
            ReferenceInput::Multiple { image_urls } => image_urls.iter_mut().collect(),
        }
    }
}

/// Returns true for `http://` and `https://` URLs that are not served from local storage.
pub fn is_remote_url(value: &str) -> bool {
    (value.starts_with("http://") || value.starts_with("https://")) && !value.contains("/static/")
}

/// Provider-facing generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Requested clip length in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    /// e.g. "16:9", "9:16", "adaptive"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_motion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// A request to generate one video clip.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct GenerationRequest {
    /// Provider name, resolved through the provider registry
    #[validate(length(min = 1, message = "provider is required"))]
    pub provider: String,

    #[serde(default)]
    pub model: Option<String>,

    #[validate(length(min = 1, max = 8000, message = "prompt must be 1-8000 characters"))]
    pub prompt: String,

    /// Explicit reference mode; inferred from the populated fields when absent
    #[serde(default)]
    pub reference_mode: Option<ReferenceMode>,

    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_local_path: Option<String>,
    #[serde(default)]
    pub first_frame_url: Option<String>,
    #[serde(default)]
    pub first_frame_local_path: Option<String>,
    #[serde(default)]
    pub last_frame_url: Option<String>,
    #[serde(default)]
    pub last_frame_local_path: Option<String>,
    #[serde(default)]
    pub reference_image_urls: Vec<String>,

    #[serde(default)]
    #[validate(range(min = 1, max = 60))]
    pub duration: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 1, max = 120))]
    pub fps: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub motion_level: Option<u32>,
    #[serde(default)]
    pub camera_motion: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default)]
    pub storyboard_id: Option<String>,
    #[serde(default)]
    pub drama_id: Option<String>,
    #[serde(default)]
    pub image_gen_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl GenerationRequest {
    /// Create a text-only request.
    pub fn new(provider: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Attach a single reference image.
    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Attach first and last frame references.
    pub fn with_frames(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_frame_url = Some(first.into());
        self.last_frame_url = Some(last.into());
        self
    }

    /// Force a reference mode.
    pub fn with_mode(mut self, mode: ReferenceMode) -> Self {
        self.reference_mode = Some(mode);
        self
    }

    fn single_image(&self) -> Option<String> {
        non_empty(&self.image_local_path).or_else(|| non_empty(&self.image_url))
    }

    fn first_frame(&self) -> Option<String> {
        non_empty(&self.first_frame_local_path).or_else(|| non_empty(&self.first_frame_url))
    }

    fn last_frame(&self) -> Option<String> {
        non_empty(&self.last_frame_local_path).or_else(|| non_empty(&self.last_frame_url))
    }

    fn reference_list(&self) -> Vec<String> {
        self.reference_image_urls
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Infer the reference mode from the populated fields.
    pub fn detect_mode(&self) -> ReferenceMode {
        if !self.reference_list().is_empty() {
            ReferenceMode::Multiple
        } else if self.first_frame().is_some() && self.last_frame().is_some() {
            ReferenceMode::FirstLast
        } else if self.single_image().is_some() || self.first_frame().is_some() {
            ReferenceMode::Single
        } else {
            ReferenceMode::None
        }
    }

    /// Resolve the reference payload for the declared (or inferred) mode.
    pub fn resolve_reference(&self) -> ModelResult<ReferenceInput> {
        let mode = self.reference_mode.unwrap_or_else(|| self.detect_mode());

        match mode {
            ReferenceMode::None => Ok(ReferenceInput::None),
            ReferenceMode::Single => self
                .single_image()
                .or_else(|| self.first_frame())
                .map(|image_url| ReferenceInput::Single { image_url })
                .ok_or_else(|| ModelError::missing_reference(mode, "image_url")),
            ReferenceMode::FirstLast => {
                let first = self
                    .first_frame()
                    .ok_or_else(|| ModelError::missing_reference(mode, "first_frame_url"))?;
                let last = self
                    .last_frame()
                    .ok_or_else(|| ModelError::missing_reference(mode, "last_frame_url"))?;
                Ok(ReferenceInput::FirstLast {
                    first_frame_url: first,
                    last_frame_url: last,
                })
            }
            ReferenceMode::Multiple => {
                let image_urls = self.reference_list();
                if image_urls.is_empty() {
                    return Err(ModelError::missing_reference(mode, "reference_image_urls"));
                }
                Ok(ReferenceInput::Multiple { image_urls })
            }
        }
    }

    /// Validate field constraints and the reference payload shape.
    pub fn validate_request(&self) -> ModelResult<ReferenceInput> {
        self.validate()?;
        if self.provider.trim().is_empty() {
            return Err(ModelError::validation("provider is required"));
        }
        self.resolve_reference()
    }

    /// Options forwarded to the provider adapter.
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            model: non_empty(&self.model),
            duration: self.duration,
            fps: self.fps,
            aspect_ratio: non_empty(&self.aspect_ratio),
            style: non_empty(&self.style),
            motion_level: self.motion_level,
            camera_motion: non_empty(&self.camera_motion),
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mode() {
        let req = GenerationRequest::new("chatfire", "a cat");
        assert_eq!(req.detect_mode(), ReferenceMode::None);

        let req = GenerationRequest::new("chatfire", "a cat").with_image("https://x/a.png");
        assert_eq!(req.detect_mode(), ReferenceMode::Single);

        let req = GenerationRequest::new("chatfire", "a cat").with_frames("a.png", "b.png");
        assert_eq!(req.detect_mode(), ReferenceMode::FirstLast);

        let mut req = GenerationRequest::new("chatfire", "a cat");
        req.reference_image_urls = vec!["a.png".into(), " ".into()];
        assert_eq!(req.detect_mode(), ReferenceMode::Multiple);
    }

    #[test]
    fn test_first_last_requires_both_frames() {
        let mut req = GenerationRequest::new("ark", "sunrise").with_mode(ReferenceMode::FirstLast);
        req.first_frame_url = Some("https://x/first.png".into());

        let err = req.validate_request().unwrap_err();
        assert_eq!(
            err,
            ModelError::missing_reference(ReferenceMode::FirstLast, "last_frame_url")
        );
    }

    #[test]
    fn test_multiple_requires_non_empty_list() {
        let req = GenerationRequest::new("ark", "sunrise").with_mode(ReferenceMode::Multiple);
        assert!(matches!(
            req.validate_request(),
            Err(ModelError::MissingReference { .. })
        ));
    }

    #[test]
    fn test_local_path_takes_precedence() {
        let mut req = GenerationRequest::new("ark", "sunrise").with_image("https://cdn/a.png");
        req.image_local_path = Some("images/a.png".into());

        let reference = req.validate_request().unwrap();
        assert_eq!(
            reference,
            ReferenceInput::Single {
                image_url: "images/a.png".into()
            }
        );
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let req = GenerationRequest::new("ark", "");
        assert!(matches!(req.validate_request(), Err(ModelError::Validation(_))));
    }

    #[test]
    fn test_reference_urls_mut() {
        let mut input = ReferenceInput::FirstLast {
            first_frame_url: "a".into(),
            last_frame_url: "b".into(),
        };
        for url in input.urls_mut() {
            url.push_str(".png");
        }
        assert_eq!(input.urls(), vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_is_remote_url() {
        assert!(is_remote_url("https://cdn.example.com/a.png"));
        assert!(!is_remote_url("http://localhost:8000/static/images/a.png"));
        assert!(!is_remote_url("images/a.png"));
        assert!(!is_remote_url("data:image/png;base64,AAAA"));
    }
}
