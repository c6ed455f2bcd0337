use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::export::{AudioTimeline, CaptureConfig, CaptureSink, NarrationSegment};
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::schedule::CapturedFrame;
use crate::session::Presenter;

/// Pacing of an export walk-through.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportTimings {
    /// Wait between showing a step and starting its narration.
    #[serde(with = "crate::config::duration_ms", rename = "settle_ms")]
    pub settle: Duration,
    /// How long a step without narration stays on screen.
    #[serde(with = "crate::config::duration_ms", rename = "fallback_hold_ms")]
    pub fallback_hold: Duration,
    /// Pause between the end of one step and the next.
    #[serde(with = "crate::config::duration_ms", rename = "step_pause_ms")]
    pub step_pause: Duration,
    /// Hold after the last step.
    #[serde(with = "crate::config::duration_ms", rename = "tail_ms")]
    pub tail: Duration,
}

impl Default for ExportTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(400),
            fallback_hold: Duration::from_millis(3000),
            step_pause: Duration::from_millis(600),
            tail: Duration::from_millis(1000),
        }
    }
}

impl ExportTimings {
    pub fn validate(&self) -> ReelResult<()> {
        let limit = Duration::from_secs(60);
        for (name, value) in [
            ("settle_ms", self.settle),
            ("fallback_hold_ms", self.fallback_hold),
            ("step_pause_ms", self.step_pause),
            ("tail_ms", self.tail),
        ] {
            if value > limit {
                return Err(ReelError::validation(format!("export.{name} must be <= 60000")));
            }
        }
        Ok(())
    }
}

/// Where an export currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportPhase {
    #[default]
    Idle,
    PreparingAudio {
        done: usize,
        total: usize,
    },
    /// Showing step `step` (0-based) on the recorded stage.
    Recording {
        step: usize,
        total: usize,
    },
    Finalizing,
}

/// Where one step begins in the recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepMark {
    pub index: usize,
    pub title: String,
    /// First captured frame showing the step.
    pub start_frame: u64,
    /// Whether the step's narration played.
    pub narrated: bool,
}

/// Result of a finished export.
#[derive(Clone, Debug)]
pub struct Recording {
    /// Frames handed to the sink.
    pub frames: u64,
    pub fps: Fps,
    pub marks: Vec<StepMark>,
    /// Narration clips in the order they played.
    pub segments: Vec<NarrationSegment>,
    /// File written by the sink, if it writes one.
    pub output: Option<PathBuf>,
}

impl Recording {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.fps.frames_to_secs(self.frames))
    }

    pub fn narrated_steps(&self) -> usize {
        self.marks.iter().filter(|m| m.narrated).count()
    }
}

/// Releases everything an export borrowed from the presenter, on every exit path.
struct ExportGuard<'a> {
    presenter: &'a Presenter,
}

impl<'a> ExportGuard<'a> {
    fn acquire(presenter: &'a Presenter) -> ReelResult<Self> {
        presenter.lock_for_export()?;
        Ok(Self { presenter })
    }

    fn phase(&self, phase: ExportPhase) {
        tracing::info!(?phase, "export phase");
        self.presenter.set_export_phase(phase);
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        let stage = self.presenter.stage();
        stage.detach_capture();
        let audio = self.presenter.audio();
        audio.detach_tap();
        audio.stop_all();
        self.presenter.set_export_phase(ExportPhase::Idle);
        self.presenter.unlock_export();
    }
}

struct Encoded {
    sink: Box<dyn CaptureSink>,
    pushed: u64,
    error: Option<ReelError>,
}

/// Drains captured frames into the sink on a dedicated thread.
///
/// The thread ends once the stage drops the capture sender.
struct FrameEncoder {
    done: oneshot::Receiver<Encoded>,
    failed: Arc<AtomicBool>,
}

impl FrameEncoder {
    fn spawn(
        mut sink: Box<dyn CaptureSink>,
        mut rx: mpsc::UnboundedReceiver<CapturedFrame>,
    ) -> ReelResult<Self> {
        let (tx, done) = oneshot::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let flag = failed.clone();
        std::thread::Builder::new()
            .name("sketchreel-capture".to_owned())
            .spawn(move || {
                let mut pushed = 0u64;
                let mut error = None;
                while let Some(captured) = rx.blocking_recv() {
                    if error.is_some() {
                        continue;
                    }
                    match sink.push_frame(captured.index, &captured.frame) {
                        Ok(()) => pushed += 1,
                        Err(e) => {
                            tracing::warn!(frame = captured.index.0, error = %e, "capture sink rejected frame");
                            flag.store(true, Ordering::Release);
                            error = Some(e);
                        }
                    }
                }
                let _ = tx.send(Encoded {
                    sink,
                    pushed,
                    error,
                });
            })
            .map_err(|e| ReelError::export_setup(format!("spawn capture thread: {e}")))?;
        Ok(Self { done, failed })
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    async fn join(self) -> ReelResult<Encoded> {
        self.done
            .await
            .map_err(|_| ReelError::Other(anyhow::anyhow!("capture thread exited without a result")))
    }
}

fn as_setup_error(err: ReelError) -> ReelError {
    match err {
        ReelError::ExportSetup(_) => err,
        other => ReelError::export_setup(other.to_string()),
    }
}

/// Record every step of `presenter` into `sink`.
///
/// Narration is prepared up front; a step whose narration cannot be loaded is held on screen for
/// the fallback duration instead. Navigation stays locked until this returns.
#[tracing::instrument(level = "info", skip_all, fields(steps = presenter.step_count()))]
pub async fn export_all(
    presenter: &Presenter,
    mut sink: Box<dyn CaptureSink>,
) -> ReelResult<Recording> {
    let guard = ExportGuard::acquire(presenter)?;
    // Navigation is locked from here on, so this snapshot is the list that gets recorded.
    let steps = presenter.steps();
    if steps.is_empty() {
        return Err(ReelError::validation("nothing to export: no steps loaded"));
    }
    presenter.quiesce();
    let timings = presenter.config().export.clone();
    let total = steps.len();

    guard.phase(ExportPhase::PreparingAudio { done: 0, total });
    let cache = presenter.cache();
    let mut clips = Vec::with_capacity(total);
    for (i, step) in steps.iter().enumerate() {
        match cache.ensure_loaded(step).await {
            Ok(clip) => clips.push(Some(clip)),
            Err(e) => {
                tracing::warn!(step = i, title = %step.title, error = %e, "no narration for step");
                clips.push(None);
            }
        }
        guard.phase(ExportPhase::PreparingAudio { done: i + 1, total });
    }

    let stage = presenter.stage();
    let audio = presenter.audio();
    let canvas = stage.canvas();
    let fps = stage.fps();
    let cfg = CaptureConfig {
        width: canvas.width,
        height: canvas.height,
        fps,
        background: presenter.background(),
    };
    sink.begin(cfg).map_err(as_setup_error)?;

    let timeline = Arc::new(AudioTimeline::new(stage.clone()));
    let (tx, rx) = mpsc::unbounded_channel();
    if let Err(e) = stage
        .attach_capture(tx)
        .and_then(|()| audio.attach_tap(timeline.clone()))
    {
        sink.abort();
        return Err(as_setup_error(e));
    }
    let encoder = FrameEncoder::spawn(sink, rx)?;

    let mut marks = Vec::with_capacity(total);
    for (i, step) in steps.iter().enumerate() {
        guard.phase(ExportPhase::Recording { step: i, total });
        let start_frame = stage.captured_frames().unwrap_or(0);
        presenter.show_for_export(i)?;
        tokio::time::sleep(timings.settle).await;

        let narrated = match &clips[i] {
            Some(clip) => match audio.connect(clip.clone(), &step.title) {
                Ok(node) => {
                    node.ended().await;
                    true
                }
                Err(e) => {
                    tracing::warn!(step = i, error = %e, "narration could not start");
                    tokio::time::sleep(timings.fallback_hold).await;
                    false
                }
            },
            None => {
                tokio::time::sleep(timings.fallback_hold).await;
                false
            }
        };
        marks.push(StepMark {
            index: i,
            title: step.title.clone(),
            start_frame,
            narrated,
        });

        if encoder.has_failed() {
            break;
        }
        if i + 1 < total {
            tokio::time::sleep(timings.step_pause).await;
        }
    }

    guard.phase(ExportPhase::Finalizing);
    if !encoder.has_failed() {
        tokio::time::sleep(timings.tail).await;
    }
    stage.detach_capture();
    audio.detach_tap();

    let Encoded {
        mut sink,
        pushed,
        error,
    } = encoder.join().await?;
    if let Some(e) = error {
        sink.abort();
        return Err(e);
    }

    let segments = timeline.segments();
    let mixed = (!segments.is_empty()).then(|| timeline.mix(pushed, fps));
    let output = tokio::task::spawn_blocking(move || {
        let out = sink.finish(mixed.as_ref());
        if out.is_err() {
            sink.abort();
        }
        out
    })
    .await
    .map_err(|e| ReelError::Other(anyhow::anyhow!("finalize task failed: {e}")))??;

    let recording = Recording {
        frames: pushed,
        fps,
        marks,
        segments,
        output,
    };
    tracing::info!(
        frames = recording.frames,
        narrated = recording.narrated_steps(),
        secs = recording.duration().as_secs_f64(),
        "export finished"
    );
    drop(guard);
    Ok(recording)
}
