//! The presenter: one explicit session object owning the stage, the current step and every
//! background activity tied to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::draw::{CommandList, Surface, TextRenderer};
use crate::export::{CaptureSink, ExportPhase, Recording, export_all};
use crate::foundation::core::Rgba8;
use crate::foundation::error::{ReelError, ReelResult};
use crate::narration::{AudioGraph, NarrationCache, PlaybackEnd};
use crate::schedule::{AnimationScheduler, ReplayHandle, Stage};
use crate::script::capture_or_notice;
use crate::services::{Planner, Synthesizer};
use crate::step::Step;

/// How a [`Presenter::speak`] call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrationOutcome {
    /// The clip played to its end.
    Completed,
    /// Playback was cut short by a stop or a step change.
    Stopped,
    /// The step changed while the clip was loading; nothing was played.
    Stale,
}

struct Slot {
    step: Step,
    /// Captured on first show; dropped when the code changes.
    commands: Option<CommandList>,
}

#[derive(Default)]
struct SessionState {
    slots: Vec<Slot>,
    current: usize,
    /// Bumped on every step change and on every new step list.
    generation: u64,
    prefetch: Option<CancellationToken>,
}

struct PresenterInner {
    config: Config,
    background: Rgba8,
    text: TextRenderer,
    stage: Stage,
    scheduler: AnimationScheduler,
    cache: NarrationCache,
    audio: AudioGraph,
    state: Mutex<SessionState>,
    exporting: AtomicBool,
    export_phase: watch::Sender<ExportPhase>,
}

/// Interactive session over a list of steps.
///
/// Cloning is cheap; clones share one session. While an export runs, navigation, replay and
/// narration calls fail with [`ReelError::NavigationLocked`].
#[derive(Clone)]
pub struct Presenter {
    inner: Arc<PresenterInner>,
}

impl std::fmt::Debug for Presenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Presenter")
            .field("steps", &st.slots.len())
            .field("current", &st.current)
            .field("generation", &st.generation)
            .field("exporting", &self.is_exporting())
            .finish()
    }
}

impl Presenter {
    /// Validate `config`, then create the stage, scheduler, narration cache and audio graph.
    ///
    /// Must be called inside a tokio runtime; the stage clock starts immediately.
    pub fn start(config: Config, synthesizer: Arc<dyn Synthesizer>) -> ReelResult<Self> {
        config.validate()?;
        let background = config.background_color()?;
        let text = TextRenderer::new(config.font_dirs.clone());
        let stage = Stage::new(config.canvas, background, config.fps, text.clone())?;
        let scheduler = AnimationScheduler::new(stage.clone(), config.stagger);
        let cache = NarrationCache::new(synthesizer, config.pcm, config.quota_breaker_threshold);
        let (export_phase, _) = watch::channel(ExportPhase::Idle);
        tracing::debug!(
            width = config.canvas.width,
            height = config.canvas.height,
            fps = config.fps.as_f64(),
            "presenter started"
        );
        Ok(Self {
            inner: Arc::new(PresenterInner {
                config,
                background,
                text,
                stage,
                scheduler,
                cache,
                audio: AudioGraph::new(),
                state: Mutex::new(SessionState::default()),
                exporting: AtomicBool::new(false),
                export_phase,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn background(&self) -> Rgba8 {
        self.inner.background
    }

    pub fn stage(&self) -> &Stage {
        &self.inner.stage
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.inner.scheduler
    }

    pub fn cache(&self) -> &NarrationCache {
        &self.inner.cache
    }

    pub fn audio(&self) -> &AudioGraph {
        &self.inner.audio
    }

    pub fn steps(&self) -> Vec<Step> {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .map(|s| s.step.clone())
            .collect()
    }

    pub fn step_count(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    pub fn current_index(&self) -> usize {
        self.inner.state.lock().current
    }

    pub fn current_step(&self) -> Option<Step> {
        let st = self.inner.state.lock();
        st.slots.get(st.current).map(|s| s.step.clone())
    }

    /// Counter bumped on every step change.
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn is_exporting(&self) -> bool {
        self.inner.exporting.load(Ordering::Acquire)
    }

    pub fn export_phase(&self) -> ExportPhase {
        *self.inner.export_phase.borrow()
    }

    pub fn subscribe_export_phase(&self) -> watch::Receiver<ExportPhase> {
        self.inner.export_phase.subscribe()
    }

    /// Replace the step list for a new query and show the first step.
    pub fn load_steps(&self, steps: Vec<Step>) -> ReelResult<ReplayHandle> {
        if steps.is_empty() {
            return Err(ReelError::validation("step list is empty"));
        }
        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        self.inner.cache.reset_quota();
        st.slots = steps
            .into_iter()
            .map(|step| Slot {
                step,
                commands: None,
            })
            .collect();
        tracing::info!(steps = st.slots.len(), "loaded steps");
        self.show_locked(&mut st, 0, true)
    }

    pub fn go_to(&self, index: usize) -> ReelResult<ReplayHandle> {
        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        let count = st.slots.len();
        if index >= count {
            return Err(ReelError::validation(format!(
                "step {index} out of range (have {count})"
            )));
        }
        self.show_locked(&mut st, index, true)
    }

    /// Advance one step. Returns `None` on the last step.
    pub fn next(&self) -> ReelResult<Option<ReplayHandle>> {
        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        if st.current + 1 >= st.slots.len() {
            return Ok(None);
        }
        let index = st.current + 1;
        self.show_locked(&mut st, index, true).map(Some)
    }

    /// Go back one step. Returns `None` on the first step.
    pub fn previous(&self) -> ReelResult<Option<ReplayHandle>> {
        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        if st.current == 0 || st.slots.is_empty() {
            return Ok(None);
        }
        let index = st.current - 1;
        self.show_locked(&mut st, index, true).map(Some)
    }

    /// Replay the current step's animation from a cleared stage.
    pub fn replay(&self) -> ReelResult<ReplayHandle> {
        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        let index = st.current;
        let commands = self.slot_commands(&mut st, index)?;
        Ok(self.inner.scheduler.play(commands))
    }

    /// Narrate the current step.
    ///
    /// Loads (or joins loading of) the clip, then plays it unless the step changed meanwhile.
    pub async fn speak(&self) -> ReelResult<NarrationOutcome> {
        self.ensure_unlocked()?;
        let (generation, step) = {
            let st = self.inner.state.lock();
            let slot = st
                .slots
                .get(st.current)
                .ok_or_else(|| ReelError::validation("no steps loaded"))?;
            (st.generation, slot.step.clone())
        };

        let clip = match self.inner.cache.ensure_loaded(&step).await {
            Ok(clip) => clip,
            Err(e) if self.generation() != generation => {
                tracing::debug!(error = %e, "narration failed for a step no longer shown");
                return Ok(NarrationOutcome::Stale);
            }
            Err(e) => return Err(e.into()),
        };
        let node = {
            // Step changes and export start take this lock, so neither can slip in before the
            // clip is connected.
            let st = self.inner.state.lock();
            if st.generation != generation || self.is_exporting() {
                tracing::debug!(title = %step.title, "discarding stale narration");
                return Ok(NarrationOutcome::Stale);
            }
            self.inner.audio.stop_all();
            self.inner.audio.connect(clip, &step.title)?
        };
        Ok(match node.ended().await {
            PlaybackEnd::Finished => NarrationOutcome::Completed,
            PlaybackEnd::Stopped => NarrationOutcome::Stopped,
        })
    }

    /// Stop interactive narration. Does nothing while an export owns the audio graph.
    pub fn stop_narration(&self) {
        let _st = self.inner.state.lock();
        if self.is_exporting() {
            tracing::debug!("stop_narration ignored during export");
            return;
        }
        self.inner.audio.stop_all();
    }

    /// Ask `planner` for new code for step `index`, keeping its title and description.
    ///
    /// The step is re-shown if it is current. Its narration stays cached since the key is
    /// unchanged.
    pub async fn regenerate(&self, index: usize, planner: &dyn Planner) -> ReelResult<()> {
        self.ensure_unlocked()?;
        let step = self
            .inner
            .state
            .lock()
            .slots
            .get(index)
            .map(|s| s.step.clone())
            .ok_or_else(|| ReelError::validation(format!("step {index} out of range")))?;

        let code = planner
            .regenerate_step_code(&step.title, &step.description)
            .await?;

        let mut st = self.inner.state.lock();
        self.ensure_unlocked()?;
        let Some(slot) = st.slots.get_mut(index) else {
            return Err(ReelError::validation(format!("step {index} out of range")));
        };
        if slot.step.title != step.title || slot.step.description != step.description {
            tracing::debug!(index, "step list changed during regeneration; dropping code");
            return Ok(());
        }
        slot.step.code = code;
        slot.commands = None;
        tracing::info!(index, "regenerated step code");
        if st.current == index {
            self.show_locked(&mut st, index, true)?;
        }
        Ok(())
    }

    /// Record all steps into `sink`. See [`export_all`].
    pub async fn export(&self, sink: Box<dyn CaptureSink>) -> ReelResult<Recording> {
        export_all(self, sink).await
    }

    /// Draw step `index` in full onto a fresh surface, leaving the stage untouched.
    pub fn render_step_image(&self, index: usize) -> ReelResult<Surface> {
        let commands = self.commands_for(index)?;
        let mut surface = Surface::with_text(
            self.inner.config.canvas,
            self.inner.background,
            self.inner.text.clone(),
        )?;
        for (i, cmd) in commands.iter().enumerate() {
            if let Err(e) = cmd.execute(&mut surface) {
                tracing::warn!(step = index, index = i, kind = cmd.kind(), error = %e, "draw command failed");
            }
        }
        Ok(surface)
    }

    /// Cancel timers and replays, close the audio graph and stop the frame clock.
    pub fn shutdown(&self) {
        if let Some(token) = self.inner.state.lock().prefetch.take() {
            token.cancel();
        }
        self.inner.scheduler.cancel();
        self.inner.audio.close();
        self.inner.stage.shutdown();
        tracing::debug!("presenter shut down");
    }

    fn ensure_unlocked(&self) -> ReelResult<()> {
        if self.is_exporting() {
            return Err(ReelError::NavigationLocked);
        }
        Ok(())
    }

    /// The step's command list, captured on first use.
    fn commands_for(&self, index: usize) -> ReelResult<CommandList> {
        let mut st = self.inner.state.lock();
        self.slot_commands(&mut st, index)
    }

    fn slot_commands(&self, st: &mut SessionState, index: usize) -> ReelResult<CommandList> {
        let slot = st
            .slots
            .get_mut(index)
            .ok_or_else(|| ReelError::validation(format!("step {index} out of range")))?;
        if let Some(commands) = &slot.commands {
            return Ok(commands.clone());
        }
        let commands = capture_or_notice(&slot.step.code, self.inner.config.canvas);
        Ok(slot.commands.insert(commands).clone())
    }

    /// Make `index` current: bump the generation, stop narration, replay its commands and
    /// (optionally) schedule a prefetch of the following step.
    ///
    /// Runs entirely under the state lock, so a narration or an export never observes a half
    /// switched step.
    fn show_locked(
        &self,
        st: &mut SessionState,
        index: usize,
        prefetch: bool,
    ) -> ReelResult<ReplayHandle> {
        let commands = self.slot_commands(st, index)?;
        st.generation += 1;
        st.current = index;
        if let Some(token) = st.prefetch.take() {
            token.cancel();
        }
        self.inner.audio.stop_all();
        let handle = self.inner.scheduler.play(commands);
        tracing::debug!(index, generation = st.generation, "showing step");

        if prefetch && let Some(next) = st.slots.get(index + 1).map(|s| s.step.clone()) {
            let token = CancellationToken::new();
            st.prefetch = Some(token.clone());
            self.inner
                .cache
                .prefetch(next, self.inner.config.prefetch_debounce, token);
        }
        Ok(handle)
    }

    /// Claim the session for an export. Taken under the state lock so it orders cleanly against
    /// navigation and narration start.
    pub(crate) fn lock_for_export(&self) -> ReelResult<()> {
        let _st = self.inner.state.lock();
        self.inner
            .exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ReelError::export_setup("an export is already running"))
    }

    pub(crate) fn unlock_export(&self) {
        self.inner.exporting.store(false, Ordering::Release);
    }

    pub(crate) fn set_export_phase(&self, phase: ExportPhase) {
        self.inner.export_phase.send_replace(phase);
    }

    /// Stop everything interactive before an export takes over.
    pub(crate) fn quiesce(&self) {
        if let Some(token) = self.inner.state.lock().prefetch.take() {
            token.cancel();
        }
        self.inner.scheduler.cancel();
        self.inner.audio.stop_all();
    }

    pub(crate) fn show_for_export(&self, index: usize) -> ReelResult<ReplayHandle> {
        let mut st = self.inner.state.lock();
        self.show_locked(&mut st, index, false)
    }
}
