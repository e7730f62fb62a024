//! FFprobe media inspection.
//!
//! Probe failures are always surfaced as typed errors. Callers decide
//! whether to fall back (e.g. to a provider-reported duration or a
//! default canvas), never this module.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Probe a media file for duration, resolution and audio presence.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let stdout = run_ffprobe(path.as_ref()).await?;
    parse_probe_output(&stdout)
}

/// Duration of a media file in seconds. Zero or missing durations are errors.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_media(path).await?;
    Ok(info.duration)
}

/// Resolution of the first video stream.
pub async fn probe_resolution(path: impl AsRef<Path>) -> MediaResult<(u32, u32)> {
    let info = probe_media(path).await?;
    Ok((info.width, info.height))
}

/// Whether a media file has an audio stream.
pub async fn has_audio_stream(path: impl AsRef<Path>) -> MediaResult<bool> {
    let info = probe_media(path).await?;
    Ok(info.has_audio)
}

async fn run_ffprobe(path: &Path) -> MediaResult<Vec<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("ffprobe failed on {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    Ok(output.stdout)
}

/// Parse ffprobe JSON into [`MediaInfo`].
pub(crate) fn parse_probe_output(raw: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_video("no video stream found"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::invalid_video("video stream has no resolution")),
    };

    // Container duration first, then the video stream's own.
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| parse_seconds(video.duration.as_deref()))
        .ok_or_else(|| MediaError::invalid_video("duration is missing or zero"))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    Ok(MediaInfo {
        duration,
        width,
        height,
        has_audio,
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}
