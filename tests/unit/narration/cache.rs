use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;

use async_trait::async_trait;

use super::*;

/// Scripted synthesizer: pops one response per call, defaulting to 100 ms of silence.
struct Scripted {
    delay: Duration,
    responses: parking_lot::Mutex<VecDeque<Result<(), SynthesisError>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(delay: Duration, responses: Vec<Result<(), SynthesisError>>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            responses: parking_lot::Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Synthesizer for Scripted {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let next = self.responses.lock().pop_front().unwrap_or(Ok(()));
        next.map(|()| vec![0u8; 2 * 2_400])
    }
}

fn cache(synth: Arc<Scripted>, threshold: u32) -> NarrationCache {
    NarrationCache::new(synth, PcmFormat::default(), threshold)
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_upstream_call() {
    let synth = Scripted::new(Duration::from_millis(500), Vec::new());
    let cache = cache(synth.clone(), 2);
    let step = Step::new("Boil", "Heat the water.", "");

    let mut joins = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let step = step.clone();
        joins.push(tokio::spawn(async move { cache.ensure_loaded(&step).await }));
    }
    let mut clips = Vec::new();
    for j in joins {
        clips.push(j.await.unwrap().unwrap());
    }

    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.upstream_calls(), 1);
    assert!(clips.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert!(!cache.is_pending(&step.narration_key()));
    assert_eq!(clips[0].duration(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn cached_clip_is_returned_without_upstream_call() {
    let synth = Scripted::new(Duration::from_millis(10), Vec::new());
    let cache = cache(synth.clone(), 2);
    let a = Step::new("Same", "text", "rect(0,0,1,1)");
    let b = Step::new("Same ", " text", "circle(0,0,1)");

    let first = cache.ensure_loaded(&a).await.unwrap();
    let second = cache.ensure_loaded(&b).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_waiter_does_not_cancel_synthesis() {
    let synth = Scripted::new(Duration::from_secs(2), Vec::new());
    let cache = cache(synth.clone(), 2);
    let step = Step::new("Slow", "one", "");

    let waiter = {
        let cache = cache.clone();
        let step = step.clone();
        tokio::spawn(async move { cache.ensure_loaded(&step).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    waiter.abort();
    assert!(cache.is_pending(&step.narration_key()));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(cache.get(&step.narration_key()).is_some());
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached_and_may_be_retried() {
    let synth = Scripted::new(
        Duration::from_millis(10),
        vec![Err(SynthesisError::Failed("boom".to_owned()))],
    );
    let cache = cache(synth.clone(), 2);
    let step = Step::new("Flaky", "service", "");

    let err = cache.ensure_loaded(&step).await.unwrap_err();
    assert_eq!(err, NarrationError::Failed("boom".to_owned()));
    assert!(cache.ensure_loaded(&step).await.is_ok());
    assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn single_rate_limit_is_not_sticky() {
    let synth = Scripted::new(
        Duration::from_millis(10),
        vec![Err(SynthesisError::RateLimited)],
    );
    let cache = cache(synth, 2);

    let err = cache
        .ensure_loaded(&Step::new("A", "a", ""))
        .await
        .unwrap_err();
    assert_eq!(err, NarrationError::RateLimited);
    assert!(!cache.quota_exceeded());
    assert!(cache.ensure_loaded(&Step::new("B", "b", "")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn consecutive_rate_limits_trip_the_breaker_until_reset() {
    let synth = Scripted::new(
        Duration::from_millis(10),
        vec![
            Err(SynthesisError::RateLimited),
            Err(SynthesisError::RateLimited),
        ],
    );
    let cache = cache(synth.clone(), 2);

    assert_eq!(
        cache.ensure_loaded(&Step::new("A", "a", "")).await,
        Err(NarrationError::RateLimited)
    );
    assert_eq!(
        cache.ensure_loaded(&Step::new("B", "b", "")).await,
        Err(NarrationError::QuotaExceeded)
    );
    assert!(cache.quota_exceeded());

    // Suppressed without reaching the service.
    assert_eq!(
        cache.ensure_loaded(&Step::new("C", "c", "")).await,
        Err(NarrationError::QuotaExceeded)
    );
    assert_eq!(synth.calls.load(Ordering::SeqCst), 2);

    cache.reset_quota();
    assert!(cache.ensure_loaded(&Step::new("C", "c", "")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn threshold_one_is_immediately_sticky() {
    let synth = Scripted::new(
        Duration::from_millis(10),
        vec![Err(SynthesisError::RateLimited)],
    );
    let cache = cache(synth, 1);
    assert_eq!(
        cache.ensure_loaded(&Step::new("A", "a", "")).await,
        Err(NarrationError::QuotaExceeded)
    );
    assert!(cache.quota_exceeded());
}

#[tokio::test(start_paused = true)]
async fn prefetch_waits_for_debounce_and_honors_cancel() {
    let synth = Scripted::new(Duration::from_millis(10), Vec::new());
    let cache = cache(synth.clone(), 2);
    let step = Step::new("Next", "one", "");

    let cancel = CancellationToken::new();
    let handle = cache.prefetch(step.clone(), Duration::from_millis(1500), cancel.clone());
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);

    let handle = cache.prefetch(step.clone(), Duration::from_millis(1500), CancellationToken::new());
    handle.await.unwrap();
    assert!(cache.get(&step.narration_key()).is_some());
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
}
