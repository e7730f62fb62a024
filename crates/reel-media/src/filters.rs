//! Filter-graph construction for multi-clip merges.
//!
//! Everything here is pure string building so the offset arithmetic and
//! stream labelling can be tested without an ffmpeg binary.

use std::path::Path;

use reel_models::encoding::{SILENCE_CHANNEL_LAYOUT, SILENCE_SAMPLE_RATE};
use reel_models::ClipSpec;

use crate::error::{MediaError, MediaResult};

/// Canvas used when no clip resolution could be probed.
pub const DEFAULT_CANVAS: (u32, u32) = (1920, 1080);

/// Output frame rate of the normalized streams entering xfade.
pub const CANVAS_FPS: u32 = 30;

/// Final video label.
pub const VIDEO_OUT: &str = "[outv]";
/// Final audio label.
pub const AUDIO_OUT: &str = "[outa]";

/// One normalized stream entering the transition graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    /// Effective (trimmed) duration, taken from the declared clip duration
    pub duration: f64,
    /// xfade transition name into the next clip
    pub transition: &'static str,
    /// Crossfade length into the next clip; 0.0 for a hard cut
    pub transition_seconds: f64,
    /// Whether the trimmed clip carries an audio stream
    pub has_audio: bool,
}

impl GraphInput {
    pub fn from_clip(clip: &ClipSpec, has_audio: bool) -> Self {
        let transition = clip
            .transition
            .as_ref()
            .and_then(|t| t.kind.as_deref())
            .map(xfade_name)
            .unwrap_or("fade");

        Self {
            duration: clip.effective_duration(),
            transition,
            transition_seconds: clip.transition_seconds(),
            has_audio,
        }
    }
}

/// A complete `-filter_complex` graph with its output labels.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGraph {
    pub filter: String,
    pub video_label: String,
    /// `None` when no input has audio
    pub audio_label: Option<String>,
}

/// Map a transition name onto an xfade transition. Unknown names become `fade`.
pub fn xfade_name(kind: &str) -> &'static str {
    match kind.trim().to_ascii_lowercase().as_str() {
        "fade" | "fadein" | "fadeout" => "fade",
        "fadeblack" => "fadeblack",
        "fadewhite" => "fadewhite",
        "fadegrays" => "fadegrays",
        "slideleft" => "slideleft",
        "slideright" => "slideright",
        "slideup" => "slideup",
        "slidedown" => "slidedown",
        "wipeleft" => "wipeleft",
        "wiperight" => "wiperight",
        "wipeup" => "wipeup",
        "wipedown" => "wipedown",
        "circleopen" => "circleopen",
        "circleclose" => "circleclose",
        "horzopen" => "horzopen",
        "horzclose" => "horzclose",
        "vertopen" => "vertopen",
        "vertclose" => "vertclose",
        "dissolve" => "dissolve",
        "distance" => "distance",
        "pixelize" => "pixelize",
        _ => "fade",
    }
}

/// Element-wise max over the probed resolutions.
///
/// Clips whose probe failed are skipped; if none succeeded the default canvas is used.
pub fn canvas_size(resolutions: &[Option<(u32, u32)>]) -> (u32, u32) {
    let known: Vec<(u32, u32)> = resolutions.iter().flatten().copied().collect();
    if known.is_empty() {
        return DEFAULT_CANVAS;
    }
    let width = known.iter().map(|r| r.0).max().unwrap_or(DEFAULT_CANVAS.0);
    let height = known.iter().map(|r| r.1).max().unwrap_or(DEFAULT_CANVAS.1);
    // libx264 with yuv420p needs even dimensions
    (width + width % 2, height + height % 2)
}

/// Crossfade offsets: pair `i` starts at the cumulative duration of clips `0..=i`.
pub fn crossfade_offsets(inputs: &[GraphInput]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(inputs.len().saturating_sub(1));
    let mut elapsed = 0.0;
    for input in inputs.iter().take(inputs.len().saturating_sub(1)) {
        elapsed += input.duration;
        offsets.push(elapsed);
    }
    offsets
}

/// Seconds the clip at `index` is extended so the next crossfade has material to blend.
fn tail_padding(inputs: &[GraphInput], index: usize) -> f64 {
    if index + 1 < inputs.len() {
        inputs[index].transition_seconds
    } else {
        0.0
    }
}

/// Scale-to-fit then centered pad to exactly fill the canvas.
pub fn normalize_filter(index: usize, canvas: (u32, u32), pad_seconds: f64) -> String {
    let (w, h) = canvas;
    let mut filter = format!(
        "[{index}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={CANVAS_FPS},format=yuv420p"
    );
    if pad_seconds > 0.0 {
        filter.push_str(&format!(
            ",tpad=stop_mode=clone:stop_duration={:.2}",
            pad_seconds
        ));
    }
    filter.push_str(&format!("[v{index}]"));
    filter
}

/// Per-clip audio source: the clip's own track (padded if needed) or synthesized silence.
pub fn audio_source_filter(index: usize, input: &GraphInput, pad_seconds: f64) -> String {
    if !input.has_audio {
        return format!(
            "anullsrc=channel_layout={}:sample_rate={}:duration={:.2}[a{index}]",
            SILENCE_CHANNEL_LAYOUT,
            SILENCE_SAMPLE_RATE,
            input.duration + pad_seconds
        );
    }

    let format = format!(
        "aresample={},aformat=sample_rates={}:channel_layouts={}",
        SILENCE_SAMPLE_RATE, SILENCE_SAMPLE_RATE, SILENCE_CHANNEL_LAYOUT
    );
    if pad_seconds > 0.0 {
        format!("[{index}:a]{format},apad=pad_dur={:.2}[a{index}]", pad_seconds)
    } else {
        format!("[{index}:a]{format},acopy[a{index}]")
    }
}

fn chain_labels(pair: usize, pairs: usize, prefix: &str, out: &str) -> (String, String, String) {
    let left = if pair == 0 {
        format!("[{prefix}0]")
    } else {
        format!("[{prefix}x{:02}]", pair - 1)
    };
    let right = format!("[{prefix}{}]", pair + 1);
    let output = if pair + 1 == pairs {
        out.to_string()
    } else {
        format!("[{prefix}x{:02}]", pair)
    };
    (left, right, output)
}

/// Build the xfade (and acrossfade) graph for two or more clips.
pub fn build_merge_graph(inputs: &[GraphInput], canvas: (u32, u32)) -> MediaResult<MergeGraph> {
    if inputs.len() < 2 {
        return Err(MediaError::invalid_input(
            "a transition graph needs at least two clips",
        ));
    }

    let pairs = inputs.len() - 1;
    let offsets = crossfade_offsets(inputs);
    let mut parts: Vec<String> = Vec::new();

    for index in 0..inputs.len() {
        parts.push(normalize_filter(index, canvas, tail_padding(inputs, index)));
    }

    for pair in 0..pairs {
        let (left, right, output) = chain_labels(pair, pairs, "v", VIDEO_OUT);
        parts.push(format!(
            "{left}{right}xfade=transition={}:duration={:.1}:offset={:.1}{output}",
            inputs[pair].transition, inputs[pair].transition_seconds, offsets[pair]
        ));
    }

    let any_audio = inputs.iter().any(|i| i.has_audio);
    if any_audio {
        for (index, input) in inputs.iter().enumerate() {
            parts.push(audio_source_filter(index, input, tail_padding(inputs, index)));
        }
        for pair in 0..pairs {
            let (left, right, output) = chain_labels(pair, pairs, "a", AUDIO_OUT);
            let seconds = inputs[pair].transition_seconds;
            // acrossfade treats d=0 as "use nb_samples", so cuts are joined end to end
            if seconds > 0.0 {
                parts.push(format!(
                    "{left}{right}acrossfade=d={:.2}:c1=tri:c2=tri{output}",
                    seconds
                ));
            } else {
                parts.push(format!("{left}{right}concat=n=2:v=0:a=1{output}"));
            }
        }
    }

    Ok(MergeGraph {
        filter: parts.join(";"),
        video_label: VIDEO_OUT.to_string(),
        audio_label: any_audio.then(|| AUDIO_OUT.to_string()),
    })
}

/// Whether the lossless concat demuxer can join these clips.
///
/// Only when no transition is declared, every clip already matches the canvas
/// and audio presence is uniform.
pub fn can_use_concat(
    inputs: &[GraphInput],
    resolutions: &[Option<(u32, u32)>],
    canvas: (u32, u32),
) -> bool {
    let no_transitions = inputs.iter().all(|i| i.transition_seconds <= 0.0);
    let uniform_size = resolutions.iter().all(|r| *r == Some(canvas));
    let uniform_audio = inputs.iter().all(|i| i.has_audio) || inputs.iter().all(|i| !i.has_audio);
    no_transitions && uniform_size && uniform_audio && resolutions.len() == inputs.len()
}

/// Concat demuxer list file contents.
pub fn concat_list<P: AsRef<Path>>(paths: &[P]) -> String {
    paths
        .iter()
        .map(|p| {
            let escaped = p.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}
