//! Video encoding configuration for trimming and merging.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Silent track layout synthesized for clips without audio.
pub const SILENCE_CHANNEL_LAYOUT: &str = "stereo";
pub const SILENCE_SAMPLE_RATE: u32 = 44_100;

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g. "fast", "medium")
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Move the moov atom to the front for seekable output
    #[serde(default)]
    pub faststart: bool,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_merge()
    }
}

impl EncodingConfig {
    /// Per-clip trim re-encode: fast preset, seekable output.
    pub fn for_trim() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: "fast".to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            faststart: true,
        }
    }

    /// Final filter-graph encode.
    pub fn for_merge() -> Self {
        Self {
            preset: "medium".to_string(),
            faststart: false,
            ..Self::for_trim()
        }
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Video codec arguments.
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ]
    }

    /// Audio codec arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = self.video_args();
        args.extend(self.audio_args());
        if self.faststart {
            args.push("-movflags".to_string());
            args.push("+faststart".to_string());
        }
        args
    }
}
