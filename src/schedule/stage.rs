use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::draw::{FrameRGBA, Surface, TextRenderer};
use crate::foundation::core::{Canvas, Fps, FrameIndex, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};

/// A frame copied off the stage while a capture is attached.
#[derive(Debug)]
pub struct CapturedFrame {
    /// 0-based index within the capture.
    pub index: FrameIndex,
    pub frame: FrameRGBA,
}

struct CaptureSlot {
    tx: mpsc::UnboundedSender<CapturedFrame>,
    frames: u64,
}

struct StageInner {
    surface: Mutex<Surface>,
    fps: Fps,
    ticks: watch::Sender<u64>,
    capture: Mutex<Option<CaptureSlot>>,
    shutdown: CancellationToken,
}

/// The display surface plus its frame clock.
///
/// The clock ticks at the configured fps on the tokio timer. Every tick bumps a frame counter and,
/// while a capture is attached, copies the surface into the capture channel.
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("fps", &self.inner.fps)
            .field("frame", &*self.inner.ticks.borrow())
            .field("capturing", &self.is_capturing())
            .finish()
    }
}

impl Stage {
    /// Create the surface and start the frame clock. Must be called inside a tokio runtime.
    pub fn new(canvas: Canvas, background: Rgba8, fps: Fps, text: TextRenderer) -> ReelResult<Self> {
        let fps = Fps::new(fps.num, fps.den)?;
        let surface = Surface::with_text(canvas, background, text)?;
        let (ticks, _) = watch::channel(0u64);
        let inner = Arc::new(StageInner {
            surface: Mutex::new(surface),
            fps,
            ticks,
            capture: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(run_clock(Arc::downgrade(&inner), inner.shutdown.clone(), fps));
        Ok(Self { inner })
    }

    pub fn fps(&self) -> Fps {
        self.inner.fps
    }

    pub fn canvas(&self) -> Canvas {
        self.inner.surface.lock().canvas()
    }

    /// Ticks elapsed since the stage started.
    pub fn frame(&self) -> u64 {
        *self.inner.ticks.borrow()
    }

    /// Exclusive access to the surface. Never hold the guard across an `.await`.
    pub fn lock_surface(&self) -> MutexGuard<'_, Surface> {
        self.inner.surface.lock()
    }

    pub fn fingerprint(&self) -> u64 {
        self.lock_surface().fingerprint()
    }

    pub fn snapshot(&self) -> FrameRGBA {
        self.lock_surface().snapshot()
    }

    /// Wait for the next frame tick. Returns `false` once the stage is shut down.
    pub async fn next_tick(&self) -> bool {
        let mut rx = self.inner.ticks.subscribe();
        rx.borrow_and_update();
        tokio::select! {
            _ = self.inner.shutdown.cancelled() => false,
            changed = rx.changed() => changed.is_ok(),
        }
    }

    /// Route every subsequent tick's frame into `tx`. Only one capture may be attached.
    pub fn attach_capture(&self, tx: mpsc::UnboundedSender<CapturedFrame>) -> ReelResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ReelError::export_setup("stage is shut down"));
        }
        let mut slot = self.inner.capture.lock();
        if slot.is_some() {
            return Err(ReelError::export_setup("stage capture already attached"));
        }
        *slot = Some(CaptureSlot { tx, frames: 0 });
        Ok(())
    }

    /// Stop capturing; returns the number of frames sent, or `None` if nothing was attached.
    pub fn detach_capture(&self) -> Option<u64> {
        self.inner.capture.lock().take().map(|slot| slot.frames)
    }

    pub fn is_capturing(&self) -> bool {
        self.inner.capture.lock().is_some()
    }

    /// Frames captured so far, if a capture is attached.
    pub fn captured_frames(&self) -> Option<u64> {
        self.inner.capture.lock().as_ref().map(|slot| slot.frames)
    }

    /// Stop the frame clock and drop any capture.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.detach_capture();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl StageInner {
    fn on_tick(&self) {
        {
            let mut capture = self.capture.lock();
            if let Some(slot) = capture.as_mut() {
                let frame = self.surface.lock().snapshot();
                let index = FrameIndex(slot.frames);
                if slot.tx.send(CapturedFrame { index, frame }).is_ok() {
                    slot.frames += 1;
                } else {
                    tracing::warn!("capture receiver dropped; detaching");
                    *capture = None;
                }
            }
        }
        self.ticks.send_modify(|n| *n += 1);
    }
}

async fn run_clock(stage: Weak<StageInner>, shutdown: CancellationToken, fps: Fps) {
    let mut interval = tokio::time::interval(fps.frame_duration());
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let Some(stage) = stage.upgrade() else {
                    break;
                };
                stage.on_tick();
            }
        }
    }
    tracing::debug!("stage frame clock stopped");
}
