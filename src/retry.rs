//! Retry policy for outbound calls.
//!
//! Semantics:
//! - `max_retries` counts retries *after* the initial attempt, so a call makes at
//!   most `max_retries + 1` attempts.
//! - A response status in `retryable_status_codes` or a retryable transport
//!   error is eligible for retry; anything else ends the loop.
//! - The delay before retry `n` (0-based) is
//!   `min(base * 2^n + jitter, max_delay)` where jitter adds up to 30% of the
//!   exponential term by default.
//!
//! Invariants:
//! - Delays never exceed `max_delay`.
//! - Delays are never below `min(base * 2^n, max_delay)`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use lifeline::RetryPolicy;
//! use lifeline::jitter::FixedRandom;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .base_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(1))
//!     .build()
//!     .unwrap();
//! assert_eq!(policy.delay_for(0, &FixedRandom::new(0.0)), Duration::from_millis(100));
//! assert!(policy.is_retryable_status(503));
//! assert!(!policy.is_retryable_status(404));
//! ```

use crate::jitter::{Jitter, RandomSource};
use crate::Backoff;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default delay cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
/// Statuses treated as transient unless overridden.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Immutable retry configuration; cheap to clone and share.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::exponential(DEFAULT_BASE_DELAY)
                .with_max(DEFAULT_MAX_DELAY)
                .unwrap_or_else(|_| Backoff::exponential(DEFAULT_BASE_DELAY)),
            jitter: Jitter::default(),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.backoff.base()
    }

    pub fn max_delay(&self) -> Duration {
        self.backoff.max().unwrap_or(crate::backoff::MAX_BACKOFF)
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    pub fn retryable_status_codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.retryable_status_codes.iter().copied()
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Delay before retry number `attempt` (0 = first retry).
    pub fn delay_for(&self, attempt: usize, random: &dyn RandomSource) -> Duration {
        let exp = self.backoff.exponential_term(attempt);
        self.backoff.cap(self.jitter.apply(exp, random))
    }
}

/// Builder for `RetryPolicy`.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Jitter,
    retryable_status_codes: BTreeSet<u16>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_delay` must be > 0 and >= `base_delay`.
    InvalidDelays { base: Duration, max: Duration },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidDelays { base, max } => {
                write!(f, "max_delay ({:?}) must be non-zero and >= base_delay ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl RetryPolicyBuilder {
    /// Create a builder with the default policy values.
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: Jitter::default(),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
        }
    }

    /// Retries after the initial attempt.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryable status set.
    pub fn retryable_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        let backoff = Backoff::exponential(self.base_delay)
            .with_max(self.max_delay)
            .map_err(|_| BuildError::InvalidDelays { base: self.base_delay, max: self.max_delay })?;
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            backoff,
            jitter: self.jitter,
            retryable_status_codes: self.retryable_status_codes,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { status: u16 },
    /// Transient failure; eligible for another attempt.
    RetryableFailure { reason: String },
    /// Ends the retry loop: a non-retryable status or transport error.
    FatalFailure { reason: String },
}

impl AttemptOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptOutcome::RetryableFailure { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success { status } => write!(f, "success ({status})"),
            AttemptOutcome::RetryableFailure { reason } => write!(f, "retryable: {reason}"),
            AttemptOutcome::FatalFailure { reason } => write!(f, "fatal: {reason}"),
        }
    }
}

/// Record of one attempt, used for logging and telemetry only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAttempt {
    /// 0-based; 0 is the initial attempt.
    pub attempt: usize,
    pub started_at_ms: u64,
    pub outcome: AttemptOutcome,
}
