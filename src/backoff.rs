//! Exponential backoff for retry delays.
//!
//! Attempt semantics: attempt index `0` is the delay before the *first retry*,
//! so `delay(0) == base`, `delay(1) == 2 * base`, and so on. The result is
//! capped at `max`; jitter is applied separately (see [`crate::jitter`]) and the
//! cap is enforced again after jitter by [`crate::RetryPolicy::delay_for`].
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use lifeline::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(5), Duration::from_secs(2)); // capped
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Exponential backoff: `base * 2^attempt`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    /// Create an exponential backoff strategy
    pub fn exponential(base: Duration) -> Self {
        Self { base, max: None }
    }

    /// Set a maximum delay. Errors if `max` is zero or `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    /// Uncapped exponential term `base * 2^attempt`, saturating at `MAX_BACKOFF`.
    pub fn exponential_term(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(u32::MAX as usize) as u32;
        let multiplier = 2u128.checked_pow(exponent).unwrap_or(u128::MAX);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64)
    }

    /// Exponential term clamped to the configured max.
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = self.exponential_term(attempt);
        self.cap(exp)
    }

    /// Clamp an arbitrary delay to this backoff's max (and `MAX_BACKOFF`).
    pub fn cap(&self, delay: Duration) -> Duration {
        let capped = self.max.map(|m| delay.min(m)).unwrap_or(delay);
        capped.min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_each_time() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let backoff =
            Backoff::exponential(Duration::from_millis(1000)).with_max(Duration::from_secs(10)).unwrap();

        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(4), Duration::from_secs(10)); // 16s capped
        assert_eq!(backoff.delay(10), Duration::from_secs(10));
    }

    #[test]
    fn exponential_backoff_handles_overflow() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(1_000_000_000), MAX_BACKOFF);
        assert_eq!(backoff.delay((u32::MAX as usize) + 10_000), MAX_BACKOFF);
    }

    #[test]
    fn with_max_validation() {
        let err = Backoff::exponential(Duration::from_secs(100))
            .with_max(Duration::from_secs(50))
            .unwrap_err();
        assert!(matches!(err, BackoffError::MaxLessThanBase { .. }));

        let err = Backoff::exponential(Duration::ZERO).with_max(Duration::ZERO).unwrap_err();
        assert_eq!(err, BackoffError::MaxMustBePositive);
    }

    #[test]
    fn zero_base_behaves() {
        let exp = Backoff::exponential(Duration::ZERO);
        assert_eq!(exp.delay(3), Duration::ZERO);
    }
}
