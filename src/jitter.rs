//! Jitter strategies and the random source that drives them.
//!
//! Retry delays are spread by adding a random fraction of the exponential term:
//! `Proportional { ratio: 0.3 }` adds between 0% and 30% on top of the delay,
//! so concurrent callers that failed together do not retry in lockstep.
//!
//! Notes:
//! - RNG: [`ThreadRandom`] (the default) draws from `rand`'s thread-local RNG.
//!   [`SeededRandom`] replays a fixed sequence and [`FixedRandom`] always returns
//!   the same sample, which lets tests assert exact delays.
//! - Precision: jitter is computed on nanoseconds and saturates instead of
//!   overflowing.
//!
//! Example:
//! ```rust
//! use lifeline::jitter::{FixedRandom, Jitter};
//! use std::time::Duration;
//!
//! let jitter = Jitter::proportional(0.3);
//! let delay = jitter.apply(Duration::from_millis(1000), &FixedRandom::new(0.5));
//! assert_eq!(delay, Duration::from_millis(1150));
//! ```

use rand::rngs::StdRng;
use rand::{rng, Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// Default jitter ratio applied to retry delays.
pub const DEFAULT_JITTER_RATIO: f64 = 0.3;

/// Source of uniformly distributed samples in `[0, 1)`.
pub trait RandomSource: Send + Sync + std::fmt::Debug {
    fn next_f64(&self) -> f64;
}

/// Thread-local RNG; non-deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rng().random::<f64>()
    }
}

/// Seeded RNG; the same seed yields the same sequence of samples.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.rng.lock().unwrap_or_else(|p| p.into_inner()).random::<f64>()
    }
}

/// Always returns the same sample (clamped into `[0, 1)`).
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(f64);

impl FixedRandom {
    pub fn new(sample: f64) -> Self {
        let sample = if sample.is_nan() { 0.0 } else { sample.clamp(0.0, 1.0 - f64::EPSILON) };
        Self(sample)
    }
}

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0
    }
}

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay
    None,
    /// Adds `random() * ratio * delay` on top of the delay.
    Proportional {
        /// Upper bound of the added fraction (0.3 = up to 30% extra).
        ratio: f64,
    },
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Proportional { ratio: DEFAULT_JITTER_RATIO }
    }
}

impl Jitter {
    /// Proportional jitter; negative or NaN ratios are treated as zero.
    pub fn proportional(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.max(0.0) };
        Jitter::Proportional { ratio }
    }

    /// Apply jitter to a delay duration, drawing one sample from `random`.
    pub fn apply(&self, delay: Duration, random: &dyn RandomSource) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Proportional { ratio } => {
                let sample = random.next_f64();
                let extra_nanos = delay.as_nanos() as f64 * ratio * sample;
                // f64 -> u64 casts saturate
                let extra = Duration::from_nanos(extra_nanos as u64);
                delay.saturating_add(extra)
            }
        }
    }
}
