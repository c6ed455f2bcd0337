//! Narration audio: decoded clips, the per-step cache with request coalescing, and the single
//! audio output graph.

mod cache;
mod clip;
mod graph;

pub use cache::NarrationCache;
pub use clip::{NarrationClip, PcmFormat};
pub use graph::{AudioGraph, AudioTap, PlaybackEnd, SourceNode};

use crate::foundation::error::ReelError;

/// Why a step has no narration clip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrationError {
    /// Sticky breaker state; cleared by [`NarrationCache::reset_quota`].
    #[error("synthesis quota exceeded")]
    QuotaExceeded,
    /// One rate-limited request; a later retry may succeed.
    #[error("synthesis rate limited")]
    RateLimited,
    #[error("synthesis failed: {0}")]
    Failed(String),
    #[error("audio decode failed: {0}")]
    Decode(String),
}

impl From<NarrationError> for ReelError {
    fn from(err: NarrationError) -> Self {
        match err {
            NarrationError::QuotaExceeded => ReelError::QuotaExceeded,
            NarrationError::RateLimited => ReelError::RateLimited,
            NarrationError::Failed(msg) => ReelError::synthesis(msg),
            NarrationError::Decode(msg) => ReelError::synthesis(format!("decode: {msg}")),
        }
    }
}
