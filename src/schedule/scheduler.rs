use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::draw::CommandList;
use crate::schedule::Stage;

/// Whether a replay is drawing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing {
        /// Commands executed (or failed) so far.
        done: usize,
        total: usize,
    },
}

/// Summary of a finished replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Commands drawn successfully.
    pub executed: usize,
    /// Commands that failed when drawn and were skipped.
    pub failed: usize,
    /// The replay stopped before reaching the end of its list.
    pub cancelled: bool,
}

struct Active {
    id: u64,
    token: CancellationToken,
}

struct SchedulerInner {
    stage: Stage,
    stagger: Duration,
    active: Mutex<Option<Active>>,
    next_id: Mutex<u64>,
    state: watch::Sender<PlaybackState>,
}

/// Replays command lists onto a [`Stage`], one command per stagger interval.
///
/// At most one replay is live: [`AnimationScheduler::play`] cancels the previous one first.
/// Cancellation takes the surface lock, so once a cancel call returns no command of the cancelled
/// replay draws again.
#[derive(Clone)]
pub struct AnimationScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for AnimationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationScheduler")
            .field("stagger", &self.inner.stagger)
            .field("state", &self.state())
            .finish()
    }
}

impl AnimationScheduler {
    pub fn new(stage: Stage, stagger: Duration) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            inner: Arc::new(SchedulerInner {
                stage,
                stagger,
                active: Mutex::new(None),
                next_id: Mutex::new(0),
                state,
            }),
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.inner.stage
    }

    pub fn stagger(&self) -> Duration {
        self.inner.stagger
    }

    pub fn state(&self) -> PlaybackState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    /// Clear the stage and start replaying `commands`.
    ///
    /// Command `i` becomes due `i * stagger` after the call and draws on the first frame tick
    /// after that.
    pub fn play(&self, commands: CommandList) -> ReplayHandle {
        self.cancel();

        let token = CancellationToken::new();
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        *self.inner.active.lock() = Some(Active {
            id,
            token: token.clone(),
        });
        self.inner.stage.lock_surface().clear();
        self.inner.state.send_replace(PlaybackState::Playing {
            done: 0,
            total: commands.len(),
        });

        let (tx, rx) = watch::channel(None);
        let inner = self.inner.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            let outcome = inner.run(&commands, &task_token).await;
            {
                let mut active = inner.active.lock();
                if active.as_ref().is_some_and(|a| a.id == id) {
                    *active = None;
                    inner.state.send_replace(PlaybackState::Idle);
                }
            }
            tracing::debug!(
                executed = outcome.executed,
                failed = outcome.failed,
                cancelled = outcome.cancelled,
                "replay finished"
            );
            let _ = tx.send(Some(outcome));
        });

        ReplayHandle {
            stage: self.inner.stage.clone(),
            token,
            done: rx,
        }
    }

    /// Cancel the live replay, if any.
    pub fn cancel(&self) {
        let active = self.inner.active.lock().take();
        if let Some(active) = active {
            let _surface = self.inner.stage.lock_surface();
            active.token.cancel();
            self.inner.state.send_replace(PlaybackState::Idle);
        }
    }

    /// Cancel any replay, then clear and draw every command synchronously.
    pub fn render_immediately(&self, commands: &CommandList) -> ReplayOutcome {
        self.cancel();
        let mut surface = self.inner.stage.lock_surface();
        surface.clear();
        let mut outcome = ReplayOutcome::default();
        for (i, cmd) in commands.iter().enumerate() {
            match cmd.execute(&mut surface) {
                Ok(()) => outcome.executed += 1,
                Err(e) => {
                    tracing::warn!(index = i, kind = cmd.kind(), error = %e, "draw command failed");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

impl SchedulerInner {
    async fn run(&self, commands: &CommandList, token: &CancellationToken) -> ReplayOutcome {
        let start = Instant::now();
        let mut outcome = ReplayOutcome::default();

        for (i, cmd) in commands.iter().enumerate() {
            let due = start + self.stagger * u32::try_from(i).unwrap_or(u32::MAX);
            let ticked = tokio::select! {
                _ = token.cancelled() => false,
                ticked = async {
                    tokio::time::sleep_until(due).await;
                    self.stage.next_tick().await
                } => ticked,
            };
            if !ticked {
                outcome.cancelled = true;
                return outcome;
            }

            {
                let mut surface = self.stage.lock_surface();
                if token.is_cancelled() {
                    outcome.cancelled = true;
                    return outcome;
                }
                match cmd.execute(&mut surface) {
                    Ok(()) => outcome.executed += 1,
                    Err(e) => {
                        tracing::warn!(index = i, kind = cmd.kind(), error = %e, "draw command failed; skipping");
                        outcome.failed += 1;
                    }
                }
            }
            if !token.is_cancelled() {
                self.state.send_replace(PlaybackState::Playing {
                    done: i + 1,
                    total: commands.len(),
                });
            }
        }
        outcome
    }
}

/// Handle to one replay. Dropping it detaches; the replay keeps running.
#[derive(Debug)]
pub struct ReplayHandle {
    stage: Stage,
    token: CancellationToken,
    done: watch::Receiver<Option<ReplayOutcome>>,
}

impl ReplayHandle {
    /// Cancel this replay. No further command of it draws once this returns.
    pub fn cancel(&self) {
        let _surface = self.stage.lock_surface();
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Wait for the replay to end, by completion or cancellation.
    pub async fn finished(&self) -> ReplayOutcome {
        let mut rx = self.done.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or_default(),
            Err(_) => ReplayOutcome {
                cancelled: true,
                ..ReplayOutcome::default()
            },
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/scheduler.rs"]
mod tests;
