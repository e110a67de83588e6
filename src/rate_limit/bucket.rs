use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::rate_limit::Decision;
use crate::sleeper::Sleeper;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

/// A token bucket for one API name.
///
/// Replenishes tokens at a fixed `rate` per second, up to `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    capacity: f64,
    rate: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket from `config`.
    pub fn new(name: impl Into<String>, config: &ApiConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            name: name.into(),
            capacity: config.burst,
            rate: config.requests_per_second,
            state: Mutex::new(BucketState { tokens: config.burst, last_refill_ms: now }),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn refilled(&self, state: &BucketState, now: u64) -> f64 {
        let elapsed_secs = now.saturating_sub(state.last_refill_ms) as f64 / 1000.0;
        (state.tokens + elapsed_secs * self.rate).min(self.capacity)
    }

    fn wait_for_one(&self, tokens: f64) -> Duration {
        // millisecond resolution, like the clock; `as` saturates
        let millis = ((1.0 - tokens) / self.rate * 1000.0).round();
        Duration::from_millis(millis as u64).min(crate::backoff::MAX_BACKOFF)
    }

    /// Refill, then take one token if available.
    pub fn try_acquire(&self) -> Decision {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tokens = self.refilled(&state, now);
        state.last_refill_ms = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Decision::Allowed { remaining: state.tokens.floor() as u32 }
        } else {
            Decision::Denied { wait: self.wait_for_one(state.tokens) }
        }
    }

    /// Take one token, sleeping for the deficit when the bucket is short.
    ///
    /// Returns how long the caller waited. After a wait the bucket is left
    /// empty with its refill timestamp set to the end of the wait. If the
    /// returned future is dropped mid-wait, no token is consumed.
    pub async fn acquire(&self, sleeper: &dyn Sleeper) -> Duration {
        match self.try_acquire() {
            Decision::Allowed { .. } => Duration::ZERO,
            Decision::Denied { wait } => {
                tracing::debug!(
                    api = %self.name,
                    wait_ms = wait.as_millis() as u64,
                    "rate limit: waiting for token"
                );
                sleeper.sleep(wait).await;
                self.drain_after_wait();
                wait
            }
        }
    }

    fn drain_after_wait(&self) {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tokens = 0.0;
        state.last_refill_ms = now;
    }

    /// Tokens available right now, including pending refill. Does not mutate.
    pub fn available_tokens(&self) -> f64 {
        let now = self.clock.now_millis();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refilled(&state, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sleeper::TrackingSleeper;

    fn bucket(rps: f64, burst: f64) -> (TokenBucket, ManualClock) {
        let clock = ManualClock::starting_at(10_000);
        let bucket = TokenBucket::new("test-api", &ApiConfig::new(rps, burst), Arc::new(clock.clone()));
        (bucket, clock)
    }

    #[test]
    fn starts_full() {
        let (bucket, _) = bucket(5.0, 10.0);
        assert_eq!(bucket.available_tokens(), 10.0);
    }

    #[tokio::test]
    async fn burst_is_served_without_waiting() {
        let (bucket, clock) = bucket(1.0, 10.0);
        let sleeper = TrackingSleeper::advancing(clock.clone());
        for _ in 0..10 {
            assert_eq!(bucket.acquire(&sleeper).await, Duration::ZERO);
        }
        assert!(sleeper.calls().is_empty());

        // the 11th waits one full token interval
        assert_eq!(bucket.acquire(&sleeper).await, Duration::from_secs(1));
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(1)]);
        assert_eq!(bucket.available_tokens(), 0.0);
    }

    #[test]
    fn try_acquire_reports_remaining_and_wait() {
        let (bucket, _) = bucket(2.0, 2.0);
        assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 1 });
        assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 0 });
        assert_eq!(bucket.try_acquire(), Decision::Denied { wait: Duration::from_millis(500) });
    }

    #[tokio::test]
    async fn partial_deficit_waits_only_for_the_remainder() {
        let (bucket, clock) = bucket(1.0, 1.0);
        let sleeper = TrackingSleeper::advancing(clock.clone());
        bucket.acquire(&sleeper).await;
        clock.advance(400);
        assert_eq!(bucket.acquire(&sleeper).await, Duration::from_millis(600));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let (bucket, clock) = bucket(10.0, 3.0);
        bucket.try_acquire();
        bucket.try_acquire();
        clock.advance(100);
        assert!((bucket.available_tokens() - 2.0).abs() < 1e-9);
        clock.advance(3_600_000);
        assert_eq!(bucket.available_tokens(), 3.0);
    }

    #[test]
    fn available_tokens_does_not_mutate() {
        let (bucket, clock) = bucket(1.0, 5.0);
        for _ in 0..5 {
            bucket.try_acquire();
        }
        clock.advance(2_000);
        assert_eq!(bucket.available_tokens(), 2.0);
        assert_eq!(bucket.available_tokens(), 2.0);
        assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 1 });
    }

    #[tokio::test]
    async fn dropped_acquire_consumes_nothing() {
        let (bucket, clock) = bucket(1.0, 1.0);
        bucket.try_acquire();
        clock.advance(500);
        // a sleeper that never completes
        #[derive(Debug)]
        struct Pending;
        impl Sleeper for Pending {
            fn sleep(&self, _: Duration) -> futures::future::BoxFuture<'static, ()> {
                Box::pin(futures::future::pending())
            }
        }
        let waited = tokio::time::timeout(Duration::from_millis(10), bucket.acquire(&Pending)).await;
        assert!(waited.is_err());
        assert_eq!(bucket.available_tokens(), 0.5);
    }
}
