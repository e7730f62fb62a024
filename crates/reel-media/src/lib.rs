//! FFmpeg CLI wrapper and multi-clip compositor.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout and stderr capture
//! - FFprobe inspection (duration, resolution, audio presence)
//! - Clip trimming and the filter-graph builder used for transitions
//! - The [`Compositor`] that merges ordered clips into one file

pub mod command;
pub mod compositor;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod trim;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compositor::{ClipMerger, Compositor, CompositorConfig, MergeOutput, SourceResolver};
pub use error::{MediaError, MediaResult};
pub use filters::{build_merge_graph, canvas_size, crossfade_offsets, xfade_name, GraphInput, MergeGraph};
pub use fs_utils::{copy_file, move_file};
pub use probe::{has_audio_stream, probe_duration, probe_media, probe_resolution, MediaInfo};
pub use trim::trim_clip;
