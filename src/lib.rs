//! sketchreel turns drawing steps into staggered, hand-drawn animations with synthesized
//! narration, and records the whole walk-through into one video.
//!
//! - Capture a step's code into a [`CommandList`] with [`script::capture`]
//! - Replay it on a [`Stage`] through an [`AnimationScheduler`]
//! - Drive everything from a [`Presenter`], including [`Presenter::export`] into a [`CaptureSink`]
#![forbid(unsafe_code)]

mod foundation;

/// Configuration file and environment overrides.
pub mod config;
/// Hand-drawn primitives and the raster surface.
pub mod draw;
/// Recording of a full walk-through.
pub mod export;
/// Query history persistence.
pub mod history;
/// Narration clips, cache and audio graph.
pub mod narration;
/// Stage clock and staggered replay.
pub mod schedule;
/// The step drawing language.
pub mod script;
/// Speech synthesis and step planning clients.
pub mod services;
/// The interactive session.
pub mod session;
/// Step data model.
pub mod step;

pub use crate::foundation::core::{BezPath, Canvas, Fps, FrameIndex, Point, Rgba8, Vec2};
pub use crate::foundation::error::{ReelError, ReelResult};

pub use crate::config::Config;
pub use crate::draw::{CommandList, DrawCommand, FrameRGBA, Surface};
pub use crate::export::{
    CaptureSink, ExportPhase, FfmpegCapture, FfmpegOpts, InMemoryCapture, Recording,
};
pub use crate::history::{HistoryRecord, HistoryStore};
pub use crate::narration::{AudioGraph, NarrationCache, NarrationClip, NarrationError};
pub use crate::schedule::{AnimationScheduler, ReplayHandle, ReplayOutcome, Stage};
pub use crate::script::{CaptureError, capture, capture_or_notice};
pub use crate::services::{Planner, Synthesizer};
pub use crate::session::{NarrationOutcome, Presenter};
pub use crate::step::{NarrationKey, Step};
