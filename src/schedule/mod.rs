//! The stage (surface plus frame clock) and staggered command replay on top of it.

mod scheduler;
mod stage;

pub use scheduler::{AnimationScheduler, PlaybackState, ReplayHandle, ReplayOutcome};
pub use stage::{CapturedFrame, Stage};
