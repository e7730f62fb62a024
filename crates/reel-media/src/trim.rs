//! Per-clip trimming.

use std::path::Path;
use tracing::debug;

use reel_models::{ClipSpec, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Build the re-encoding trim command for one clip.
///
/// The trim always re-encodes so the output is structurally valid and seekable.
/// A degenerate window (`end <= start`, or both zero) re-encodes the whole clip.
pub fn trim_command(
    clip: &ClipSpec,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);
    if clip.has_trim_window() {
        cmd = cmd.start_at(clip.start_time).end_at(clip.end_time);
    }
    cmd.output_args(encoding.to_ffmpeg_args())
}

/// Trim (or re-encode) a clip into `output`.
pub async fn trim_clip(
    runner: &FfmpegRunner,
    clip: &ClipSpec,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    encoding: &EncodingConfig,
) -> MediaResult<()> {
    debug!(
        order = clip.order,
        start = clip.start_time,
        end = clip.end_time,
        whole = !clip.has_trim_window(),
        "Trimming clip"
    );
    let cmd = trim_command(clip, input, output, encoding);
    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_window_uses_output_seek() {
        let clip = ClipSpec::new("a.mp4", 10.0, 0).with_trim(2.0, 7.0);
        let args = trim_command(&clip, "in.mp4", "out.mp4", &EncodingConfig::for_trim()).build_args();

        let joined = args.join(" ");
        assert!(joined.contains("-i in.mp4 -ss 2.00 -to 7.00 -c:v libx264 -preset fast -crf 23"));
        assert!(joined.contains("-c:a aac -b:a 128k -movflags +faststart"));
    }

    #[test]
    fn test_degenerate_window_reencodes_whole_clip() {
        for clip in [
            ClipSpec::new("a.mp4", 10.0, 0),
            ClipSpec::new("a.mp4", 10.0, 0).with_trim(7.0, 2.0),
            ClipSpec::new("a.mp4", 10.0, 0).with_trim(3.0, 3.0),
        ] {
            let args =
                trim_command(&clip, "in.mp4", "out.mp4", &EncodingConfig::for_trim()).build_args();
            assert!(!args.contains(&"-ss".to_string()));
            assert!(!args.contains(&"-to".to_string()));
            assert!(args.contains(&"libx264".to_string()));
        }
    }
}
