//! One adapter per vendor wire format.

pub mod ark;
pub mod chatfire;
pub mod minimax;
pub mod pika;
pub mod runway;
pub mod sora;

use serde::Serialize;

use reel_models::ReferenceInput;

pub use ark::ArkProvider;
pub use chatfire::ChatfireProvider;
pub use minimax::MinimaxProvider;
pub use pika::PikaProvider;
pub use runway::RunwayProvider;
pub use sora::SoraProvider;

/// One element of a seedance-style `content` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ContentPart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<ImageUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    fn text(text: String) -> Self {
        Self {
            kind: "text",
            text: Some(text),
            image_url: None,
            role: None,
        }
    }

    fn image(url: &str, role: Option<&'static str>) -> Self {
        Self {
            kind: "image_url",
            text: None,
            image_url: Some(ImageUrl {
                url: url.to_string(),
            }),
            role,
        }
    }
}

/// Prompt with `--ratio` / `--dur` flags appended.
pub(crate) fn prompt_with_flags(prompt: &str, ratio: &str, duration: u32) -> String {
    let mut text = prompt.to_string();
    if !ratio.is_empty() {
        text.push_str(&format!("  --ratio {}", ratio));
    }
    if duration > 0 {
        text.push_str(&format!("  --dur {}", duration));
    }
    text
}

/// Text part followed by one image part per reference, roled by mode.
pub(crate) fn seedance_content(reference: &ReferenceInput, prompt_text: String) -> Vec<ContentPart> {
    let mut content = vec![ContentPart::text(prompt_text)];
    match reference {
        ReferenceInput::None => {}
        ReferenceInput::Single { image_url } => content.push(ContentPart::image(image_url, None)),
        ReferenceInput::FirstLast {
            first_frame_url,
            last_frame_url,
        } => {
            content.push(ContentPart::image(first_frame_url, Some("first_frame")));
            content.push(ContentPart::image(last_frame_url, Some("last_frame")));
        }
        ReferenceInput::Multiple { image_urls } => {
            content.extend(
                image_urls
                    .iter()
                    .map(|url| ContentPart::image(url, Some("reference_image"))),
            );
        }
    }
    content
}

/// First reference image, if any.
pub(crate) fn first_reference(reference: &ReferenceInput) -> Option<&str> {
    reference.urls().into_iter().next()
}
