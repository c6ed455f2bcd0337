use crate::script::CaptureError;

/// Convenience result type used across sketchreel.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy.
///
/// Per-command and per-step failures are contained by the component that observes them; only
/// setup-time (`ExportSetup`) and planning-time (`PlanningFailed`) errors abort the operation they
/// belong to.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid user-provided data or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Step code failed while building its command list.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// A captured command failed when it was finally drawn.
    #[error("command execution error: {0}")]
    CommandExecution(String),

    /// One narration request failed; the caller may retry later.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// The synthesis service asked us to slow down.
    #[error("synthesis rate limited")]
    RateLimited,

    /// Sticky, session-scoped quota failure. Cleared only by a new top-level query.
    #[error("synthesis quota exceeded")]
    QuotaExceeded,

    /// Capture sink or recording capability unavailable.
    #[error("export setup error: {0}")]
    ExportSetup(String),

    /// The planner produced nothing usable.
    #[error("planning failed: {0}")]
    PlanningFailed(String),

    /// Navigation was requested while an export session owns the presenter.
    #[error("navigation locked: an export session is active")]
    NavigationLocked,

    /// A narration source is already connected to the audio graph.
    #[error("audio graph busy: {0}")]
    AudioBusy(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::CommandExecution`] value.
    pub fn command(msg: impl Into<String>) -> Self {
        Self::CommandExecution(msg.into())
    }

    /// Build a [`ReelError::SynthesisFailed`] value.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::SynthesisFailed(msg.into())
    }

    /// Build a [`ReelError::ExportSetup`] value.
    pub fn export_setup(msg: impl Into<String>) -> Self {
        Self::ExportSetup(msg.into())
    }

    /// Build a [`ReelError::PlanningFailed`] value.
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::PlanningFailed(msg.into())
    }

    /// Build a [`ReelError::AudioBusy`] value.
    pub fn audio_busy(msg: impl Into<String>) -> Self {
        Self::AudioBusy(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
