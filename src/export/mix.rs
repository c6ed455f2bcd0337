use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use parking_lot::Mutex;

use crate::foundation::core::Fps;
use crate::foundation::error::ReelResult;
use crate::narration::{AudioTap, NarrationClip};
use crate::schedule::Stage;

/// Sample rate of the exported narration track.
pub const MIX_SAMPLE_RATE: u32 = 48_000;
/// Channel count of the exported narration track.
pub const MIX_CHANNELS: u16 = 2;

/// One narration clip placed on the recording timeline.
#[derive(Clone, Debug)]
pub struct NarrationSegment {
    /// Tag the clip was connected with (the step title).
    pub tag: String,
    /// Captured frame the clip started on.
    pub start_frame: u64,
    pub clip: Arc<NarrationClip>,
}

impl NarrationSegment {
    pub fn start_time(&self, fps: Fps) -> Duration {
        Duration::from_secs_f64(fps.frames_to_secs(self.start_frame))
    }

    pub fn end_time(&self, fps: Fps) -> Duration {
        self.start_time(fps) + self.clip.duration()
    }
}

/// Interleaved `f32` PCM of the whole recording.
#[derive(Clone, Debug, PartialEq)]
pub struct MixedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl MixedAudio {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate.max(1)))
    }

    /// Write raw little-endian `f32` samples, the layout `ffmpeg -f f32le` reads.
    pub fn write_f32le(&self, out_path: &Path) -> ReelResult<()> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("create audio output directory '{}'", parent.display())
            })?;
        }
        let mut bytes = Vec::<u8>::with_capacity(self.samples.len() * 4);
        for &sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(out_path, bytes)
            .with_context(|| format!("write mixed audio '{}'", out_path.display()))?;
        Ok(())
    }
}

/// Audio tap that records where each narration clip started on the captured video.
///
/// Placement uses the number of frames the stage has captured so far, so segment positions line
/// up with the frames the sink receives.
pub struct AudioTimeline {
    stage: Stage,
    segments: Mutex<Vec<NarrationSegment>>,
}

impl std::fmt::Debug for AudioTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTimeline")
            .field("segments", &self.segments.lock().len())
            .finish()
    }
}

impl AudioTimeline {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            segments: Mutex::new(Vec::new()),
        }
    }

    pub fn segments(&self) -> Vec<NarrationSegment> {
        self.segments.lock().clone()
    }

    /// Mix every placed segment into a track `frames` video frames long.
    pub fn mix(&self, frames: u64, fps: Fps) -> MixedAudio {
        mix_segments(&self.segments.lock(), frames, fps)
    }
}

impl AudioTap for AudioTimeline {
    fn on_connect(&self, clip: &Arc<NarrationClip>, tag: &str) {
        let start_frame = self.stage.captured_frames().unwrap_or(0);
        tracing::debug!(tag, start_frame, "narration placed on export timeline");
        self.segments.lock().push(NarrationSegment {
            tag: tag.to_owned(),
            start_frame,
            clip: clip.clone(),
        });
    }
}

/// Sum `segments` into a 48 kHz stereo track, resampling and upmixing each clip.
pub fn mix_segments(segments: &[NarrationSegment], frames: u64, fps: Fps) -> MixedAudio {
    let total = frame_to_sample(frames, fps, MIX_SAMPLE_RATE) as usize;
    let channels = usize::from(MIX_CHANNELS);
    let mut out = vec![0.0f32; total * channels];

    for seg in segments {
        let start = frame_to_sample(seg.start_frame, fps, MIX_SAMPLE_RATE) as usize;
        mix_clip(&mut out, start, &seg.clip);
    }

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }
    MixedAudio {
        sample_rate: MIX_SAMPLE_RATE,
        channels: MIX_CHANNELS,
        samples: out,
    }
}

fn mix_clip(out: &mut [f32], start: usize, clip: &NarrationClip) {
    let src = clip.samples();
    let src_channels = usize::from(clip.channels().max(1));
    let src_frames = clip.frames();
    if src_frames == 0 {
        return;
    }
    let out_frames = out.len() / usize::from(MIX_CHANNELS);
    let step = f64::from(clip.sample_rate()) / f64::from(MIX_SAMPLE_RATE);

    for dst in start..out_frames {
        let src_pos = (dst - start) as f64 * step;
        let f0 = src_pos.floor() as usize;
        if f0 >= src_frames {
            break;
        }
        let f1 = (f0 + 1).min(src_frames - 1);
        let frac = (src_pos - f0 as f64) as f32;

        let sample = |frame: usize, ch: usize| src[frame * src_channels + ch.min(src_channels - 1)];
        let lerp = |ch: usize| {
            let a = sample(f0, ch);
            a + (sample(f1, ch) - a) * frac
        };

        let idx = dst * usize::from(MIX_CHANNELS);
        out[idx] += lerp(0);
        out[idx + 1] += lerp(1);
    }
}

/// Convert a frame count to the nearest sample index at `sample_rate`.
pub fn frame_to_sample(frames: u64, fps: Fps, sample_rate: u32) -> u64 {
    let num = u128::from(frames) * u128::from(sample_rate) * u128::from(fps.den);
    let den = u128::from(fps.num.max(1));
    ((num + (den / 2)) / den) as u64
}
