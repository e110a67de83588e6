//! Clock abstractions used by the rate limiter and circuit breaker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// Notes: resets when the process restarts, which matches the lifetime of the
/// limiter and breaker state it drives.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same time, so a clone handed to a client can be advanced
/// from the test body.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at `millis`.
    pub fn starting_at(millis: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(millis)) }
    }

    /// Move time forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
