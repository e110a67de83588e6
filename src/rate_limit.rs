//! Rate limiting primitives.
//!
//! This module provides the building blocks for per-API rate limiting:
//! - [`TokenBucket`]: lazily refilled bucket; one per API name.
//! - [`RateLimiterRegistry`]: creates buckets on first use from the API config.
//! - [`Decision`]: the result of a non-blocking acquisition check.
//!
//! # Refill model
//!
//! A bucket holds up to `burst` tokens and gains `requests_per_second` tokens
//! per second of elapsed time, computed on demand. A new bucket starts full.
//! Acquiring a token when fewer than one is available waits exactly long enough
//! for the deficit to refill, then leaves the bucket empty.

use std::time::Duration;

mod bucket;
mod registry;

pub use bucket::TokenBucket;
pub use registry::RateLimiterRegistry;

/// The decision returned by [`TokenBucket::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// A token was taken.
    Allowed {
        /// Whole tokens left after this acquisition.
        remaining: u32,
    },
    /// No token was taken.
    Denied {
        /// How long until one token has refilled.
        wait: Duration,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}
