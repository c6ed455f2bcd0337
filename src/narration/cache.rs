use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::narration::{NarrationClip, NarrationError, PcmFormat};
use crate::services::{SynthesisError, Synthesizer};
use crate::step::{NarrationKey, Step};

type PendingClip = Shared<BoxFuture<'static, Result<Arc<NarrationClip>, NarrationError>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<NarrationKey, Arc<NarrationClip>>,
    pending: HashMap<NarrationKey, PendingClip>,
    consecutive_rate_limits: u32,
    quota_exceeded: bool,
}

struct CacheInner {
    synth: Arc<dyn Synthesizer>,
    pcm: PcmFormat,
    breaker_threshold: u32,
    state: Mutex<CacheState>,
    upstream_calls: AtomicU64,
}

/// Content-addressed cache of decoded narration, keyed by [`NarrationKey`].
///
/// Concurrent requests for one key share a single upstream call. The upstream call runs in its
/// own task, so callers that give up waiting do not cancel it.
#[derive(Clone)]
pub struct NarrationCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for NarrationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("NarrationCache")
            .field("entries", &st.entries.len())
            .field("pending", &st.pending.len())
            .field("quota_exceeded", &st.quota_exceeded)
            .finish()
    }
}

impl NarrationCache {
    /// `breaker_threshold` consecutive rate limits trip the sticky quota state (minimum 1).
    pub fn new(synth: Arc<dyn Synthesizer>, pcm: PcmFormat, breaker_threshold: u32) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                synth,
                pcm,
                breaker_threshold: breaker_threshold.max(1),
                state: Mutex::new(CacheState::default()),
                upstream_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self, key: &NarrationKey) -> Option<Arc<NarrationClip>> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    pub fn is_pending(&self, key: &NarrationKey) -> bool {
        self.inner.state.lock().pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn quota_exceeded(&self) -> bool {
        self.inner.state.lock().quota_exceeded
    }

    /// Clear the quota breaker. Called whenever a new top-level query starts.
    pub fn reset_quota(&self) {
        let mut st = self.inner.state.lock();
        if st.quota_exceeded {
            tracing::info!("narration quota breaker reset");
        }
        st.quota_exceeded = false;
        st.consecutive_rate_limits = 0;
    }

    /// Number of synthesis requests sent upstream so far.
    pub fn upstream_calls(&self) -> u64 {
        self.inner.upstream_calls.load(Ordering::Relaxed)
    }

    /// Return the step's clip, synthesizing it at most once per key.
    pub async fn ensure_loaded(&self, step: &Step) -> Result<Arc<NarrationClip>, NarrationError> {
        let key = step.narration_key();
        let pending = {
            let mut st = self.inner.state.lock();
            if let Some(clip) = st.entries.get(&key) {
                tracing::debug!(%key, "narration cache hit");
                return Ok(clip.clone());
            }
            if let Some(pending) = st.pending.get(&key) {
                tracing::debug!(%key, "joining in-flight synthesis");
                pending.clone()
            } else {
                if st.quota_exceeded {
                    return Err(NarrationError::QuotaExceeded);
                }
                let inner = self.inner.clone();
                let task = tokio::spawn(inner.load(key.clone(), step.narration_text()));
                let pending = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(NarrationError::Failed(format!("synthesis task failed: {e}")))
                    })
                }
                .boxed()
                .shared();
                st.pending.insert(key, pending.clone());
                pending
            }
        };
        pending.await
    }

    /// After `debounce`, load `step` in the background unless `cancel` fires first.
    ///
    /// Errors are logged and dropped. Cancellation only affects the debounce wait.
    pub fn prefetch(
        &self,
        step: Step,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(title = %step.title, "prefetch superseded");
                }
                _ = tokio::time::sleep(debounce) => {
                    if let Err(e) = cache.ensure_loaded(&step).await {
                        tracing::debug!(title = %step.title, error = %e, "prefetch failed");
                    }
                }
            }
        })
    }
}

impl CacheInner {
    async fn load(
        self: Arc<Self>,
        key: NarrationKey,
        text: String,
    ) -> Result<Arc<NarrationClip>, NarrationError> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, "synthesizing narration");

        let result = match self.synth.synthesize(&text).await {
            Ok(bytes) => {
                let pcm = self.pcm;
                match tokio::task::spawn_blocking(move || NarrationClip::decode(&bytes, pcm)).await
                {
                    Ok(decoded) => decoded.map(Arc::new),
                    Err(e) => Err(NarrationError::Decode(format!("decode task failed: {e}"))),
                }
            }
            Err(SynthesisError::RateLimited) => Err(NarrationError::RateLimited),
            Err(SynthesisError::Failed(msg)) => Err(NarrationError::Failed(msg)),
        };

        let mut st = self.state.lock();
        st.pending.remove(&key);
        match result {
            Ok(clip) => {
                st.consecutive_rate_limits = 0;
                st.entries.insert(key, clip.clone());
                Ok(clip)
            }
            Err(NarrationError::RateLimited) => {
                st.consecutive_rate_limits += 1;
                if st.consecutive_rate_limits >= self.breaker_threshold {
                    st.quota_exceeded = true;
                    tracing::warn!(
                        consecutive = st.consecutive_rate_limits,
                        "narration quota breaker tripped; synthesis suspended"
                    );
                    Err(NarrationError::QuotaExceeded)
                } else {
                    tracing::warn!(%key, "narration rate limited");
                    Err(NarrationError::RateLimited)
                }
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "narration synthesis failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/narration/cache.rs"]
mod tests;
