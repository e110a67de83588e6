//! Circuit breaker implementation with lock-free atomics
//!
//! One breaker guards one API name. Admission ([`CircuitBreaker::try_acquire`])
//! hands out a [`Permit`]; the caller reports the terminal outcome through the
//! permit, so the breaker observes exactly one outcome per admitted call.
//!
//! # Behavior
//! - **Closed**: every call is admitted. Each recorded failure increments the
//!   consecutive-failure count; reaching `failure_threshold` opens the circuit.
//!   A recorded success resets the count.
//! - **Open**: calls are rejected until more than `reset_timeout` has passed
//!   since the last failure; the first admission check after that moves the
//!   breaker to half-open and is admitted as the trial.
//! - **HalfOpen**: at most `half_open_max_calls` trials are in flight (1 by
//!   default); others are rejected. The trial's success closes the circuit,
//!   its failure re-opens it with a fresh failure timestamp.
//!
//! A permit dropped without recording an outcome only frees its half-open slot.

use crate::clock::{Clock, MonotonicClock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the reset timeout elapses.
    Open,
    /// Probe mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

fn u8_to_state(v: u8) -> CircuitState {
    match v {
        STATE_CLOSED => CircuitState::Closed,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        // unknown values are treated as open
        _ => CircuitState::Open,
    }
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: usize,
    pub(crate) reset_timeout: Duration,
    pub(crate) half_open_max_calls: usize,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    InvalidFailureThreshold {
        /// Value provided by caller.
        provided: usize,
    },
    /// Reset timeout must be > 0.
    InvalidResetTimeout(Duration),
    /// Half-open probe limit must be > 0.
    InvalidHalfOpenLimit {
        /// Value provided by caller.
        provided: usize,
    },
}

impl fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerError::InvalidFailureThreshold { provided } => {
                write!(f, "failure_threshold must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidResetTimeout(timeout) => {
                write!(f, "reset_timeout must be > 0 (got {:?})", timeout)
            }
            CircuitBreakerError::InvalidHalfOpenLimit { provided } => {
                write!(f, "half_open_max_calls must be > 0 (got {})", provided)
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config with validation; half-open trials default to 1.
    pub fn new(
        failure_threshold: usize,
        reset_timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        let cfg = Self { failure_threshold, reset_timeout, half_open_max_calls: 1 };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override the maximum number of concurrent half-open trials; must be > 0.
    pub fn with_half_open_limit(mut self, limit: usize) -> Result<Self, CircuitBreakerError> {
        if limit == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: limit });
        }
        self.half_open_max_calls = limit;
        Ok(self)
    }

    fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if self.half_open_max_calls == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 });
        }
        if self.reset_timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidResetTimeout(self.reset_timeout));
        }
        Ok(())
    }

    /// Consecutive failures before opening from Closed.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// How long to stay Open before a half-open trial.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Maximum concurrent calls while Half-Open.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: AtomicU8,
    failure_count: AtomicUsize,
    last_failure_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
    /// Bumped on every transition to open and on reset; trials from an older
    /// generation no longer decide the state.
    generation: AtomicU64,
}

/// Point-in-time view of a breaker, as reported by the stats surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: usize,
}

/// Why an admission check was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Consecutive failures at the time of rejection.
    pub failures: usize,
    /// Time since the failure that (re-)opened the circuit.
    pub open_for: Duration,
}

/// Circuit breaker for one API name.
///
/// Clones share the same underlying state via `Arc`, so all handles observe and
/// affect the same circuit lifecycle.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    state: Arc<CircuitBreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker using the monotonic clock.
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(MonotonicClock::default()))
    }

    /// Create a breaker driven by `clock` (useful for deterministic tests).
    pub fn with_clock(
        name: impl Into<Arc<str>>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(CircuitBreakerState {
                state: AtomicU8::new(CircuitState::Closed.to_u8()),
                failure_count: AtomicUsize::new(0),
                last_failure_at_millis: AtomicU64::new(0),
                half_open_calls: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
            }),
            config,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current breaker state.
    pub fn state(&self) -> CircuitState {
        u8_to_state(self.state.state.load(Ordering::Acquire))
    }

    /// Current consecutive-failure count.
    pub fn failure_count(&self) -> usize {
        self.state.failure_count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot { state: self.state(), failures: self.failure_count() }
    }

    /// Admission check.
    ///
    /// # Errors
    /// Returns a [`Rejection`] while the circuit is open and the reset timeout has
    /// not elapsed, or while half-open with all trial slots taken.
    pub fn try_acquire(&self) -> Result<Permit, Rejection> {
        loop {
            match self.state() {
                CircuitState::Closed => {
                    return Ok(Permit::new(self.clone(), false, false, self.generation()))
                }
                CircuitState::Open => {
                    let elapsed = self.elapsed_since_failure();
                    if elapsed <= self.reset_timeout_millis() {
                        return Err(self.rejection(elapsed));
                    }
                    let generation = self.generation();
                    // Claim the trial slot before publishing HalfOpen so concurrent
                    // callers that see HalfOpen find it taken.
                    self.state.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    match self.state.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::info!(api = %self.name, "circuit breaker → half-open");
                            return Ok(Permit::new(self.clone(), true, true, generation));
                        }
                        Err(_) => {
                            self.release_trial_slot();
                            continue;
                        }
                    }
                }
                CircuitState::HalfOpen => {
                    let generation = self.generation();
                    let current = self.state.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if current >= self.config.half_open_max_calls {
                        self.release_trial_slot();
                        return Err(self.rejection(self.elapsed_since_failure()));
                    }
                    tracing::debug!(
                        api = %self.name,
                        in_flight = current + 1,
                        max = self.config.half_open_max_calls,
                        "circuit breaker: half-open trial admitted"
                    );
                    return Ok(Permit::new(self.clone(), true, false, generation));
                }
            }
        }
    }

    /// Force the breaker closed and clear the failure count.
    ///
    /// Trials admitted before the reset are orphaned: their outcomes only
    /// adjust the failure count.
    pub fn reset(&self) {
        self.state.generation.fetch_add(1, Ordering::AcqRel);
        self.state.half_open_calls.store(0, Ordering::Release);
        self.state.failure_count.store(0, Ordering::Release);
        self.state.state.store(STATE_CLOSED, Ordering::Release);
        tracing::info!(api = %self.name, "circuit breaker reset → closed");
    }

    /// Returns `Some(Closed)` when this success closed a half-open circuit.
    fn on_success(&self, trial: bool, generation: u64) -> Option<CircuitState> {
        self.state.failure_count.store(0, Ordering::Release);
        if self.is_current_trial(trial, generation)
            && self
                .state
                .state
                .compare_exchange(STATE_HALF_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::info!(api = %self.name, "circuit breaker → closed");
            return Some(CircuitState::Closed);
        }
        None
    }

    /// Returns `Some(Open)` when this failure opened the circuit.
    fn on_failure(&self, trial: bool, generation: u64) -> Option<CircuitState> {
        let failures = self.state.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        let (from, should_open) = match self.state() {
            CircuitState::Closed => (STATE_CLOSED, failures >= self.config.failure_threshold),
            CircuitState::HalfOpen => (STATE_HALF_OPEN, self.is_current_trial(trial, generation)),
            CircuitState::Open => return None,
        };
        if !should_open {
            return None;
        }
        // Timestamp first: a reader that observes Open must not see a stale one.
        self.state.last_failure_at_millis.store(self.clock.now_millis(), Ordering::Release);
        if self
            .state
            .state
            .compare_exchange(from, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        // orphan the trials of the cycle that just ended
        self.state.generation.fetch_add(1, Ordering::AcqRel);
        self.state.half_open_calls.store(0, Ordering::Release);
        if from == STATE_HALF_OPEN {
            tracing::warn!(api = %self.name, failures, "circuit breaker: trial failed → open");
        } else {
            tracing::error!(
                api = %self.name,
                failures,
                threshold = self.config.failure_threshold,
                "circuit breaker → open"
            );
        }
        Some(CircuitState::Open)
    }

    fn generation(&self) -> u64 {
        self.state.generation.load(Ordering::Acquire)
    }

    fn is_current_trial(&self, trial: bool, generation: u64) -> bool {
        trial && generation == self.generation()
    }

    /// Free a trial slot claimed in `generation`; slots of older generations
    /// were already cleared.
    fn release_trial_slot_of(&self, generation: u64) {
        if generation == self.generation() {
            self.release_trial_slot();
        }
    }

    fn release_trial_slot(&self) {
        let _ = self.state.half_open_calls.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |n| n.checked_sub(1),
        );
    }

    fn elapsed_since_failure(&self) -> u64 {
        let last = self.state.last_failure_at_millis.load(Ordering::Acquire);
        self.clock.now_millis().saturating_sub(last)
    }

    fn reset_timeout_millis(&self) -> u64 {
        u64::try_from(self.config.reset_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn rejection(&self, elapsed_millis: u64) -> Rejection {
        Rejection {
            failures: self.failure_count(),
            open_for: Duration::from_millis(elapsed_millis),
        }
    }

    #[cfg(test)]
    fn set_last_failure_at(&self, millis: u64) {
        self.state.last_failure_at_millis.store(millis, Ordering::Release);
    }
}

/// Proof of admission. Record the call's terminal outcome through it.
#[must_use = "dropping a permit records nothing; call record_success or record_failure"]
#[derive(Debug)]
pub struct Permit {
    breaker: CircuitBreaker,
    trial: bool,
    opened_half_open: bool,
    generation: u64,
}

impl Permit {
    fn new(breaker: CircuitBreaker, trial: bool, opened_half_open: bool, generation: u64) -> Self {
        Self { breaker, trial, opened_half_open, generation }
    }

    /// Whether this call is a half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Whether this admission moved the breaker from open to half-open.
    pub fn opened_half_open(&self) -> bool {
        self.opened_half_open
    }

    /// Record success; returns the new state if it changed.
    pub fn record_success(mut self) -> Option<CircuitState> {
        let transition = self.breaker.on_success(self.trial, self.generation);
        self.release();
        transition
    }

    /// Record failure; returns the new state if it changed.
    pub fn record_failure(mut self) -> Option<CircuitState> {
        let transition = self.breaker.on_failure(self.trial, self.generation);
        self.release();
        transition
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.trial) {
            self.breaker.release_trial_slot_of(self.generation);
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: usize, reset_ms: u64) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::starting_at(1_000_000);
        let config = CircuitBreakerConfig::new(threshold, Duration::from_millis(reset_ms))
            .expect("valid config");
        (CircuitBreaker::with_clock("test", config, Arc::new(clock.clone())), clock)
    }

    fn fail(breaker: &CircuitBreaker) -> Option<CircuitState> {
        breaker.try_acquire().expect("admitted").record_failure()
    }

    fn succeed(breaker: &CircuitBreaker) -> Option<CircuitState> {
        breaker.try_acquire().expect("admitted").record_success()
    }

    #[test]
    fn rejects_zero_failure_threshold() {
        let err = CircuitBreakerConfig::new(0, Duration::from_secs(1))
            .expect_err("zero failures should be invalid");
        assert!(matches!(err, CircuitBreakerError::InvalidFailureThreshold { provided: 0 }));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = CircuitBreakerConfig::new(1, Duration::ZERO).expect_err("zero timeout");
        assert!(matches!(err, CircuitBreakerError::InvalidResetTimeout(Duration::ZERO)));
    }

    #[test]
    fn rejects_zero_half_open_limit() {
        let err = CircuitBreakerConfig::new(1, Duration::from_secs(1))
            .and_then(|cfg| cfg.with_half_open_limit(0))
            .expect_err("zero half-open limit should be invalid");
        assert!(matches!(err, CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 }));
    }

    #[test]
    fn starts_closed() {
        let (breaker, _) = breaker(5, 30_000);
        assert_eq!(breaker.snapshot(), BreakerSnapshot { state: CircuitState::Closed, failures: 0 });
        assert!(!breaker.try_acquire().unwrap().is_trial());
    }

    #[test]
    fn opens_at_exactly_the_threshold() {
        let (breaker, _) = breaker(5, 30_000);
        for _ in 0..4 {
            assert_eq!(fail(&breaker), None);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        assert_eq!(fail(&breaker), Some(CircuitState::Open));
        assert_eq!(breaker.snapshot(), BreakerSnapshot { state: CircuitState::Open, failures: 5 });
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn success_resets_the_streak() {
        let (breaker, _) = breaker(5, 30_000);
        for _ in 0..3 {
            fail(&breaker);
        }
        succeed(&breaker);
        assert_eq!(breaker.failure_count(), 0);

        for _ in 0..4 {
            fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Closed, "only 4 failures since the success");
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_rejects_until_timeout_strictly_elapsed() {
        let (breaker, clock) = breaker(1, 30_000);
        fail(&breaker);

        clock.advance(30_000);
        let rejection = breaker.try_acquire().expect_err("exactly at timeout is still open");
        assert_eq!(rejection.failures, 1);
        assert_eq!(rejection.open_for, Duration::from_millis(30_000));

        clock.advance(1);
        let permit = breaker.try_acquire().expect("trial admitted");
        assert!(permit.is_trial());
        assert!(permit.opened_half_open());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_exactly_one_trial() {
        let (breaker, clock) = breaker(5, 30_000);
        for _ in 0..5 {
            fail(&breaker);
        }
        breaker.set_last_failure_at(clock.now_millis() - 30_000 - 1);

        let trial = breaker.try_acquire().expect("first check admitted");
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err(), "second check must be rejected");
        drop(trial);
    }

    #[test]
    fn failed_trial_reopens_with_fresh_timestamp() {
        let (breaker, clock) = breaker(5, 30_000);
        for _ in 0..5 {
            fail(&breaker);
        }
        clock.advance(30_001);

        let trial = breaker.try_acquire().expect("trial");
        assert_eq!(trial.record_failure(), Some(CircuitState::Open));
        assert_eq!(breaker.snapshot(), BreakerSnapshot { state: CircuitState::Open, failures: 6 });

        // fresh timestamp: still rejected right after
        assert!(breaker.try_acquire().is_err());
        clock.advance(30_001);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn successful_trial_closes_and_zeroes_failures() {
        let (breaker, clock) = breaker(5, 30_000);
        for _ in 0..5 {
            fail(&breaker);
        }
        clock.advance(30_001);

        let trial = breaker.try_acquire().expect("trial");
        assert_eq!(trial.record_success(), Some(CircuitState::Closed));
        assert_eq!(breaker.snapshot(), BreakerSnapshot { state: CircuitState::Closed, failures: 0 });
    }

    #[test]
    fn dropped_trial_frees_the_slot_without_changing_state() {
        let (breaker, clock) = breaker(1, 1_000);
        fail(&breaker);
        clock.advance(1_001);

        drop(breaker.try_acquire().expect("trial"));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let next = breaker.try_acquire().expect("slot was released");
        assert!(next.is_trial());
        assert!(!next.opened_half_open());
    }

    #[test]
    fn stale_closed_permit_does_not_close_half_open_circuit() {
        let (breaker, clock) = breaker(1, 1_000);
        let stale = breaker.try_acquire().expect("admitted while closed");
        fail(&breaker);
        clock.advance(1_001);
        let trial = breaker.try_acquire().expect("trial");

        assert_eq!(stale.record_success(), None);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(trial.record_success(), Some(CircuitState::Closed));
    }

    #[test]
    fn reset_forces_closed() {
        let (breaker, _) = breaker(2, 30_000);
        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.snapshot(), BreakerSnapshot { state: CircuitState::Closed, failures: 0 });
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn trial_admitted_before_reset_cannot_close_a_later_cycle() {
        let (breaker, clock) = breaker(1, 1_000);
        fail(&breaker);
        clock.advance(1_001);
        let orphan = breaker.try_acquire().expect("first trial");

        breaker.reset();
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
        clock.advance(1_001);
        let trial = breaker.try_acquire().expect("trial of the new cycle");
        assert!(trial.opened_half_open());

        assert_eq!(orphan.record_success(), None);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_err(), "current trial still holds the slot");

        assert_eq!(trial.record_success(), Some(CircuitState::Closed));
    }

    #[test]
    fn orphaned_trial_failure_does_not_reopen() {
        let (breaker, clock) = breaker(1, 1_000);
        fail(&breaker);
        clock.advance(1_001);
        let orphan = breaker.try_acquire().expect("first trial");

        breaker.reset();
        fail(&breaker);
        clock.advance(1_001);
        let trial = breaker.try_acquire().expect("trial of the new cycle");

        assert_eq!(orphan.record_failure(), None);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(trial.record_success(), Some(CircuitState::Closed));
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn reset_frees_slots_held_by_in_flight_trials() {
        let clock = ManualClock::starting_at(1_000_000);
        let config = CircuitBreakerConfig::new(1, Duration::from_millis(1_000))
            .and_then(|cfg| cfg.with_half_open_limit(2))
            .expect("valid config");
        let breaker = CircuitBreaker::with_clock("test", config, Arc::new(clock.clone()));
        fail(&breaker);
        clock.advance(1_001);
        let first = breaker.try_acquire().expect("trial");
        let second = breaker.try_acquire().expect("second trial slot");

        breaker.reset();
        fail(&breaker);
        clock.advance(1_001);
        let _opening = breaker.try_acquire().expect("trial of the new cycle");
        let _next = breaker.try_acquire().expect("old trials must not hold slots");
        assert!(breaker.try_acquire().is_err());

        // orphans releasing late must not free slots of the new cycle
        drop(first);
        drop(second);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn concurrent_failures_open_exactly_once() {
        let (breaker, _) = breaker(8, 30_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let permit = breaker.try_acquire().expect("admitted");
                std::thread::spawn(move || permit.record_failure())
            })
            .collect();
        let opened = handles
            .into_iter()
            .filter_map(|h| h.join().expect("thread"))
            .filter(|s| *s == CircuitState::Open)
            .count();
        assert_eq!(opened, 1);
        assert_eq!(breaker.failure_count(), 8);
    }

    #[test]
    fn state_serializes_kebab_case() {
        let json = serde_json::to_string(&BreakerSnapshot {
            state: CircuitState::HalfOpen,
            failures: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"half-open","failures":2}"#);
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
