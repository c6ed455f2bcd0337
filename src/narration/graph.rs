use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::foundation::error::{ReelError, ReelResult};
use crate::narration::NarrationClip;

/// How a source stopped producing audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// The clip played to its end.
    Finished,
    /// `stop`, `stop_all` or `close` cut it short.
    Stopped,
}

/// Observer of every clip connected to the graph.
pub trait AudioTap: Send + Sync {
    fn on_connect(&self, clip: &Arc<NarrationClip>, tag: &str);
}

struct ActiveSource {
    id: u64,
    tag: String,
    stop: CancellationToken,
}

#[derive(Default)]
struct GraphState {
    active: Option<ActiveSource>,
    tap: Option<Arc<dyn AudioTap>>,
    next_id: u64,
    closed: bool,
}

/// The single narration output.
///
/// At most one source is connected at any time; playback advances on the tokio clock, so paused
/// test time drives it deterministically.
#[derive(Clone, Default)]
pub struct AudioGraph {
    state: Arc<Mutex<GraphState>>,
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("AudioGraph")
            .field("active", &st.active.as_ref().map(|a| a.tag.clone()))
            .field("tapped", &st.tap.is_some())
            .field("closed", &st.closed)
            .finish()
    }
}

impl AudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `clip`. Fails with [`ReelError::AudioBusy`] while another source is connected.
    pub fn connect(&self, clip: Arc<NarrationClip>, tag: &str) -> ReelResult<SourceNode> {
        let (tx, rx) = watch::channel(None);
        let stop = CancellationToken::new();
        let (id, tap) = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(ReelError::audio_busy("audio graph is closed"));
            }
            if let Some(active) = &st.active {
                return Err(ReelError::audio_busy(format!(
                    "'{}' is still connected",
                    active.tag
                )));
            }
            st.next_id += 1;
            let id = st.next_id;
            st.active = Some(ActiveSource {
                id,
                tag: tag.to_owned(),
                stop: stop.clone(),
            });
            (id, st.tap.clone())
        };

        if let Some(tap) = tap {
            tap.on_connect(&clip, tag);
        }
        tracing::debug!(tag, duration_ms = clip.duration().as_millis() as u64, "narration started");

        let state = self.state.clone();
        let duration = clip.duration();
        let token = stop.clone();
        let tag_owned = tag.to_owned();
        tokio::spawn(async move {
            let end = tokio::select! {
                _ = token.cancelled() => PlaybackEnd::Stopped,
                _ = tokio::time::sleep(duration) => PlaybackEnd::Finished,
            };
            {
                let mut st = state.lock();
                if st.active.as_ref().is_some_and(|a| a.id == id) {
                    st.active = None;
                }
            }
            tracing::debug!(tag = %tag_owned, ?end, "narration ended");
            let _ = tx.send(Some(end));
        });

        Ok(SourceNode {
            tag: tag.to_owned(),
            stop,
            done: rx,
        })
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Disconnect whatever is playing.
    pub fn stop_all(&self) {
        if let Some(active) = self.state.lock().active.take() {
            active.stop.cancel();
        }
    }

    /// Attach the single tap. Fails if one is already attached.
    pub fn attach_tap(&self, tap: Arc<dyn AudioTap>) -> ReelResult<()> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(ReelError::export_setup("audio graph is closed"));
        }
        if st.tap.is_some() {
            return Err(ReelError::export_setup("audio tap already attached"));
        }
        st.tap = Some(tap);
        Ok(())
    }

    pub fn detach_tap(&self) {
        self.state.lock().tap = None;
    }

    /// Stop playback and refuse further connections.
    pub fn close(&self) {
        let mut st = self.state.lock();
        st.closed = true;
        st.tap = None;
        if let Some(active) = st.active.take() {
            active.stop.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Handle to one connected clip.
#[derive(Debug)]
pub struct SourceNode {
    tag: String,
    stop: CancellationToken,
    done: watch::Receiver<Option<PlaybackEnd>>,
}

impl SourceNode {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Resolves once the clip finished or was stopped; the graph is free again by then.
    pub async fn ended(&self) -> PlaybackEnd {
        let mut rx = self.done.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(end) => (*end).unwrap_or(PlaybackEnd::Stopped),
            Err(_) => PlaybackEnd::Stopped,
        }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn clip(ms: u64) -> Arc<NarrationClip> {
        Arc::new(NarrationClip::silence(Duration::from_millis(ms), 24_000, 1))
    }

    #[tokio::test(start_paused = true)]
    async fn plays_for_clip_duration_then_frees_the_output() {
        let graph = AudioGraph::new();
        let start = tokio::time::Instant::now();
        let node = graph.connect(clip(1200), "a").unwrap();
        assert!(graph.is_playing());
        assert_eq!(node.ended().await, PlaybackEnd::Finished);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1200) && elapsed < Duration::from_millis(1210));
        assert!(!graph.is_playing());
        graph.connect(clip(10), "b").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_source_is_rejected_while_busy() {
        let graph = AudioGraph::new();
        let _a = graph.connect(clip(1000), "a").unwrap();
        let err = graph.connect(clip(1000), "b").unwrap_err();
        assert!(matches!(err, ReelError::AudioBusy(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_disconnects_immediately() {
        let graph = AudioGraph::new();
        let node = graph.connect(clip(5000), "a").unwrap();
        graph.stop_all();
        assert!(!graph.is_playing());
        assert_eq!(node.ended().await, PlaybackEnd::Stopped);
        graph.connect(clip(10), "b").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tap_sees_connections_and_close_refuses_more() {
        struct Count(parking_lot::Mutex<Vec<String>>);
        impl AudioTap for Count {
            fn on_connect(&self, _clip: &Arc<NarrationClip>, tag: &str) {
                self.0.lock().push(tag.to_owned());
            }
        }

        let graph = AudioGraph::new();
        let tap = Arc::new(Count(parking_lot::Mutex::new(Vec::new())));
        graph.attach_tap(tap.clone()).unwrap();
        assert!(graph.attach_tap(tap.clone()).is_err());
        graph.connect(clip(10), "x").unwrap().ended().await;
        assert_eq!(*tap.0.lock(), vec!["x".to_owned()]);

        graph.close();
        assert!(graph.is_closed());
        assert!(graph.connect(clip(10), "y").is_err());
    }
}
