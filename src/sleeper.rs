//! Abstraction for sleeping/waiting
//!
//! Rate-limit waits and retry backoff both suspend through a [`Sleeper`], which
//! enables fast, deterministic tests without real time delays.

use crate::clock::ManualClock;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstraction for sleeping/waiting
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Production sleeper using tokio runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test sleeper that doesn't actually sleep
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

/// Test sleeper that records every requested sleep.
///
/// When built with [`TrackingSleeper::advancing`], each sleep also moves a
/// [`ManualClock`] forward by the requested duration, so clock-driven state
/// (token refill, breaker cool-down) observes the "elapsed" time.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
    clock: Option<ManualClock>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record sleeps and advance `clock` by each of them.
    pub fn advancing(clock: ManualClock) -> Self {
        Self { calls: Arc::default(), clock: Some(clock) }
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Sum of all recorded sleeps.
    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(duration);
        if let Some(clock) = &self.clock {
            clock.advance(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
        }
        Box::pin(async {})
    }
}
