//! Multi-clip compositor.
//!
//! A merge runs sequentially: resolve every source, trim each clip, probe the
//! trimmed clips, then invoke ffmpeg once with either the concat demuxer or an
//! xfade/acrossfade filter graph. All intermediates live in a per-merge
//! [`tempfile::TempDir`] that is removed on success and failure alike.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use reel_models::{ClipSpec, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    build_merge_graph, can_use_concat, canvas_size, concat_list, GraphInput,
};
use crate::fs_utils::{copy_file, move_file};
use crate::probe::{probe_duration, probe_media, MediaInfo};
use crate::trim::trim_clip;

/// Turns a clip source (local path or remote URL) into a readable local file.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolve `source`. Remote sources are downloaded into `scratch`, which
    /// the compositor owns and removes afterwards.
    async fn resolve(&self, source: &str, scratch: &Path) -> MediaResult<PathBuf>;
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    /// Absolute path of the merged file
    pub path: PathBuf,
    /// Probed duration, or the sum of effective clip durations if probing failed
    pub total_duration: f64,
}

/// Something that can merge clips into one file.
#[async_trait]
pub trait ClipMerger: Send + Sync {
    async fn merge(&self, clips: &[ClipSpec], output: &Path) -> MediaResult<MergeOutput>;
}

/// Compositor configuration.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Parent directory for per-merge scratch directories
    pub scratch_dir: PathBuf,
    pub ffmpeg_timeout: Duration,
    pub trim_encoding: EncodingConfig,
    pub merge_encoding: EncodingConfig,
}

impl CompositorConfig {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Default::default()
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("reel"),
            ffmpeg_timeout: Duration::from_secs(3600),
            trim_encoding: EncodingConfig::for_trim(),
            merge_encoding: EncodingConfig::for_merge(),
        }
    }
}

/// A trimmed clip ready to enter the graph.
#[derive(Debug)]
struct PreparedClip {
    spec: ClipSpec,
    path: PathBuf,
    resolution: Option<(u32, u32)>,
    has_audio: bool,
}

impl PreparedClip {
    /// Audio presence must be known for every clip, so a failed probe aborts the merge.
    fn from_probe(spec: ClipSpec, path: PathBuf, probe: MediaResult<MediaInfo>) -> MediaResult<Self> {
        let info = probe.map_err(|e| {
            MediaError::invalid_video(format!(
                "trimmed clip {} ({}) could not be probed: {}",
                spec.order, spec.source, e
            ))
        })?;
        let resolution = (info.width > 0 && info.height > 0).then_some((info.width, info.height));
        Ok(Self {
            spec,
            path,
            resolution,
            has_audio: info.has_audio,
        })
    }
}

/// FFmpeg-backed [`ClipMerger`].
pub struct Compositor<R> {
    resolver: R,
    config: CompositorConfig,
}

impl<R: SourceResolver> Compositor<R> {
    pub fn new(resolver: R, config: CompositorConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout)
    }

    async fn scratch(&self) -> MediaResult<tempfile::TempDir> {
        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;
        Ok(tempfile::Builder::new()
            .prefix("merge-")
            .tempdir_in(&self.config.scratch_dir)?)
    }

    /// Resolve every source before any encoding starts, in `order`.
    async fn resolve_all(
        &self,
        clips: &[ClipSpec],
        scratch: &Path,
    ) -> MediaResult<Vec<(ClipSpec, PathBuf)>> {
        let mut resolved = Vec::with_capacity(clips.len());
        for clip in clips {
            let path = self
                .resolver
                .resolve(&clip.source, scratch)
                .await
                .map_err(|e| match e {
                    MediaError::SourceUnavailable { .. } => e,
                    other => MediaError::source_unavailable(&clip.source, other.to_string()),
                })?;
            resolved.push((clip.clone(), path));
        }
        Ok(resolved)
    }

    async fn prepare(
        &self,
        resolved: Vec<(ClipSpec, PathBuf)>,
        scratch: &Path,
    ) -> MediaResult<Vec<PreparedClip>> {
        let runner = self.runner();
        let mut prepared = Vec::with_capacity(resolved.len());

        for (index, (spec, source)) in resolved.into_iter().enumerate() {
            let trimmed = scratch.join(format!("trim_{index:03}.mp4"));
            trim_clip(&runner, &spec, &source, &trimmed, &self.config.trim_encoding).await?;

            let probe = probe_media(&trimmed).await;
            prepared.push(PreparedClip::from_probe(spec, trimmed, probe)?);
        }
        Ok(prepared)
    }

    async fn render(
        &self,
        prepared: &[PreparedClip],
        scratch: &Path,
        rendered: &Path,
    ) -> MediaResult<()> {
        let resolutions: Vec<Option<(u32, u32)>> = prepared.iter().map(|c| c.resolution).collect();
        let canvas = canvas_size(&resolutions);
        let inputs: Vec<GraphInput> = prepared
            .iter()
            .map(|c| GraphInput::from_clip(&c.spec, c.has_audio))
            .collect();

        let cmd = if can_use_concat(&inputs, &resolutions, canvas) {
            info!(clips = prepared.len(), "Joining clips with concat demuxer");
            metrics::counter!("reel_merge_path_total", "path" => "concat").increment(1);

            let list_path = scratch.join("concat.txt");
            let paths: Vec<&Path> = prepared.iter().map(|c| c.path.as_path()).collect();
            tokio::fs::write(&list_path, concat_list(&paths)).await?;

            FfmpegCommand::without_inputs(rendered)
                .add_input_with_args(["-f", "concat", "-safe", "0"], &list_path)
                .codec_copy()
        } else {
            let graph = build_merge_graph(&inputs, canvas)?;
            info!(
                clips = prepared.len(),
                width = canvas.0,
                height = canvas.1,
                audio = graph.audio_label.is_some(),
                "Merging clips with transition graph"
            );
            debug!(filter = %graph.filter, "Merge filter graph");
            metrics::counter!("reel_merge_path_total", "path" => "xfade").increment(1);

            let mut cmd = FfmpegCommand::without_inputs(rendered);
            for clip in prepared {
                cmd = cmd.add_input(&clip.path);
            }
            cmd = cmd
                .filter_complex(graph.filter)
                .map(graph.video_label)
                .output_args(self.config.merge_encoding.video_args());
            if let Some(audio) = graph.audio_label {
                cmd = cmd
                    .map(audio)
                    .output_args(self.config.merge_encoding.audio_args());
            }
            cmd
        };

        self.runner().run(&cmd).await
    }

    async fn merge_in(
        &self,
        clips: &[ClipSpec],
        output: &Path,
        scratch: &Path,
    ) -> MediaResult<MergeOutput> {
        let mut ordered = clips.to_vec();
        ordered.sort_by_key(|c| c.order);
        let declared: f64 = ordered.iter().map(ClipSpec::effective_duration).sum();

        let resolved = self.resolve_all(&ordered, scratch).await?;

        if let [(clip, source)] = resolved.as_slice() {
            if clip.has_trim_window() {
                let trimmed = scratch.join("trim_000.mp4");
                trim_clip(&self.runner(), clip, source, &trimmed, &self.config.trim_encoding)
                    .await?;
                move_file(&trimmed, output).await?;
            } else {
                copy_file(source, output).await?;
            }
        } else {
            let prepared = self.prepare(resolved, scratch).await?;
            let rendered = scratch.join("merged.mp4");
            self.render(&prepared, scratch, &rendered).await?;
            move_file(&rendered, output).await?;
        }

        let total_duration = match probe_duration(output).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, fallback = declared, "Could not probe merged output duration");
                declared
            }
        };

        Ok(MergeOutput {
            path: output.to_path_buf(),
            total_duration,
        })
    }
}

#[async_trait]
impl<R: SourceResolver> ClipMerger for Compositor<R> {
    async fn merge(&self, clips: &[ClipSpec], output: &Path) -> MediaResult<MergeOutput> {
        if clips.is_empty() {
            return Err(MediaError::invalid_input("no clips to merge"));
        }

        let scratch = self.scratch().await?;
        let result = self.merge_in(clips, output, scratch.path()).await;

        if result.is_err() && output.exists() {
            let _ = tokio::fs::remove_file(output).await;
        }
        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove merge scratch directory");
        }
        result
    }
}
