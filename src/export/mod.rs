//! Recording: walks every step on the stage, captures its frames and narration, and hands both to
//! a [`CaptureSink`].

mod ffmpeg;
mod mix;
mod orchestrator;
mod sink;

pub use ffmpeg::{FfmpegCapture, FfmpegOpts, ensure_parent_dir, is_ffmpeg_on_path};
pub use mix::{
    AudioTimeline, MIX_CHANNELS, MIX_SAMPLE_RATE, MixedAudio, NarrationSegment, frame_to_sample,
    mix_segments,
};
pub use orchestrator::{ExportPhase, ExportTimings, Recording, StepMark, export_all};
pub use sink::{CaptureConfig, CaptureSink, InMemoryCapture};
