use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::draw::FrameRGBA;
use crate::export::MixedAudio;
use crate::foundation::core::{Fps, FrameIndex, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};

/// Configuration handed to a [`CaptureSink`] when a recording starts.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    /// Opaque color used to flatten any remaining alpha.
    pub background: Rgba8,
}

/// Consumer of the frames and narration track of one export.
///
/// Ordering contract: `push_frame` is called with strictly increasing indices between `begin` and
/// `finish`. `abort` may be called at any point after `begin` and must release every resource.
pub trait CaptureSink: Send {
    /// Called once before any frame is pushed.
    fn begin(&mut self, cfg: CaptureConfig) -> ReelResult<()>;
    /// Push one frame in strictly increasing order.
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()>;
    /// Finalize the recording, muxing `audio` when present. Returns the output location, if any.
    fn finish(&mut self, audio: Option<&MixedAudio>) -> ReelResult<Option<PathBuf>>;
    /// Drop everything produced so far.
    fn abort(&mut self);
}

#[derive(Debug, Default)]
struct MemoryState {
    cfg: Option<CaptureConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    audio: Option<MixedAudio>,
    finished: bool,
    aborted: bool,
}

/// In-memory sink for tests and tooling.
///
/// Clones share the same storage, so a caller can keep a handle while the export owns the sink.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCapture {
    state: Arc<Mutex<MemoryState>>,
    keep_pixels: bool,
}

impl InMemoryCapture {
    /// Keep every frame, pixels included.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            keep_pixels: true,
        }
    }

    /// Keep frame indices and sizes only; pixel buffers are dropped to bound memory.
    pub fn frames_only() -> Self {
        Self {
            state: Arc::default(),
            keep_pixels: false,
        }
    }

    pub fn config(&self) -> Option<CaptureConfig> {
        self.state.lock().cfg.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn frame_indices(&self) -> Vec<FrameIndex> {
        self.state.lock().frames.iter().map(|(i, _)| *i).collect()
    }

    pub fn frame(&self, n: usize) -> Option<FrameRGBA> {
        self.state.lock().frames.get(n).map(|(_, f)| f.clone())
    }

    pub fn audio(&self) -> Option<MixedAudio> {
        self.state.lock().audio.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

impl CaptureSink for InMemoryCapture {
    fn begin(&mut self, cfg: CaptureConfig) -> ReelResult<()> {
        let mut st = self.state.lock();
        *st = MemoryState {
            cfg: Some(cfg),
            ..MemoryState::default()
        };
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let mut st = self.state.lock();
        if st.cfg.is_none() {
            return Err(ReelError::export_setup("capture not started"));
        }
        if let Some((last, _)) = st.frames.last()
            && idx <= *last
        {
            return Err(ReelError::validation(format!(
                "out-of-order frame {} after {}",
                idx.0, last.0
            )));
        }
        let stored = if self.keep_pixels {
            frame.clone()
        } else {
            FrameRGBA {
                width: frame.width,
                height: frame.height,
                data: Vec::new(),
                premultiplied: frame.premultiplied,
            }
        };
        st.frames.push((idx, stored));
        Ok(())
    }

    fn finish(&mut self, audio: Option<&MixedAudio>) -> ReelResult<Option<PathBuf>> {
        let mut st = self.state.lock();
        if st.cfg.is_none() {
            return Err(ReelError::export_setup("capture not started"));
        }
        st.audio = audio.cloned();
        st.finished = true;
        Ok(None)
    }

    fn abort(&mut self) {
        let mut st = self.state.lock();
        st.frames.clear();
        st.audio = None;
        st.aborted = true;
    }
}
