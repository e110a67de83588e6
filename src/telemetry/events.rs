use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Events emitted while a resilient fetch runs.
///
/// Every event carries the API name it concerns, so one sink can observe all
/// integrations and still tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Rate limiter events
    RateLimit(RateLimitEvent),
    /// Retry events
    Retry(RetryEvent),
    /// Circuit breaker events
    CircuitBreaker(CircuitBreakerEvent),
    /// Terminal outcome of a fetch
    Request(RequestOutcome),
}

/// Events emitted by the per-API token bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// The caller waited for a token to refill.
    Waited { api_name: String, wait: Duration },
}

/// Events emitted by the attempt loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retry is about to be made.
    ///
    /// Emitted before sleeping; `attempt` is the 0-based index of the attempt
    /// that failed.
    Scheduled { api_name: String, attempt: usize, delay: Duration, reason: String },
    /// All attempts failed with a retryable outcome.
    Exhausted { api_name: String, attempts: usize },
}

/// Events emitted on circuit breaker transitions and rejections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerEvent {
    /// Circuit transitioned to open state.
    Opened { api_name: String, failure_count: usize },
    /// Circuit transitioned to half-open; a trial call is in flight.
    HalfOpen { api_name: String },
    /// Circuit transitioned to closed state.
    Closed { api_name: String },
    /// A call was refused without touching the network.
    Rejected { api_name: String, failure_count: usize },
}

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A response was returned to the caller (any status that ended the loop).
    Success { api_name: String, status: u16, attempts: usize, duration: Duration },
    /// The fetch ended in an error after at least one attempt.
    Failure { api_name: String, attempts: usize, duration: Duration },
    /// The caller cancelled the fetch.
    Cancelled { api_name: String, attempts: usize },
}

impl FetchEvent {
    /// API name the event concerns.
    pub fn api_name(&self) -> &str {
        match self {
            FetchEvent::RateLimit(RateLimitEvent::Waited { api_name, .. })
            | FetchEvent::Retry(RetryEvent::Scheduled { api_name, .. })
            | FetchEvent::Retry(RetryEvent::Exhausted { api_name, .. })
            | FetchEvent::CircuitBreaker(CircuitBreakerEvent::Opened { api_name, .. })
            | FetchEvent::CircuitBreaker(CircuitBreakerEvent::HalfOpen { api_name })
            | FetchEvent::CircuitBreaker(CircuitBreakerEvent::Closed { api_name })
            | FetchEvent::CircuitBreaker(CircuitBreakerEvent::Rejected { api_name, .. })
            | FetchEvent::Request(RequestOutcome::Success { api_name, .. })
            | FetchEvent::Request(RequestOutcome::Failure { api_name, .. })
            | FetchEvent::Request(RequestOutcome::Cancelled { api_name, .. }) => api_name,
        }
    }
}

impl fmt::Display for FetchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchEvent::RateLimit(event) => write!(f, "RateLimit::{}", event),
            FetchEvent::Retry(event) => write!(f, "Retry::{}", event),
            FetchEvent::CircuitBreaker(event) => write!(f, "CircuitBreaker::{}", event),
            FetchEvent::Request(event) => write!(f, "Request::{}", event),
        }
    }
}

impl fmt::Display for RateLimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitEvent::Waited { api_name, wait } => {
                write!(f, "Waited({}, wait={:?})", api_name, wait)
            }
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Scheduled { api_name, attempt, delay, reason } => {
                write!(f, "Scheduled({}, #{}, delay={:?}, {})", api_name, attempt, delay, reason)
            }
            RetryEvent::Exhausted { api_name, attempts } => {
                write!(f, "Exhausted({}, attempts={})", api_name, attempts)
            }
        }
    }
}

impl fmt::Display for CircuitBreakerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerEvent::Opened { api_name, failure_count } => {
                write!(f, "Opened({}, failures={})", api_name, failure_count)
            }
            CircuitBreakerEvent::HalfOpen { api_name } => write!(f, "HalfOpen({})", api_name),
            CircuitBreakerEvent::Closed { api_name } => write!(f, "Closed({})", api_name),
            CircuitBreakerEvent::Rejected { api_name, failure_count } => {
                write!(f, "Rejected({}, failures={})", api_name, failure_count)
            }
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOutcome::Success { api_name, status, attempts, duration } => write!(
                f,
                "Success({}, status={}, attempts={}, duration={:?})",
                api_name, status, attempts, duration
            ),
            RequestOutcome::Failure { api_name, attempts, duration } => write!(
                f,
                "Failure({}, attempts={}, duration={:?})",
                api_name, attempts, duration
            ),
            RequestOutcome::Cancelled { api_name, attempts } => {
                write!(f, "Cancelled({}, attempts={})", api_name, attempts)
            }
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert a FetchEvent into a JSON value for sinks.
pub fn event_to_json(event: &FetchEvent) -> serde_json::Value {
    match event {
        FetchEvent::RateLimit(RateLimitEvent::Waited { api_name, wait }) => json!({
            "kind": "rate_limit_wait",
            "api": api_name,
            "wait_ms": clamp_u64(wait.as_millis()),
        }),
        FetchEvent::Retry(r) => match r {
            RetryEvent::Scheduled { api_name, attempt, delay, reason } => json!({
                "kind": "retry_scheduled",
                "api": api_name,
                "attempt": *attempt,
                "delay_ms": clamp_u64(delay.as_millis()),
                "reason": reason,
            }),
            RetryEvent::Exhausted { api_name, attempts } => json!({
                "kind": "retry_exhausted",
                "api": api_name,
                "attempts": *attempts,
            }),
        },
        FetchEvent::CircuitBreaker(c) => match c {
            CircuitBreakerEvent::Opened { api_name, failure_count } => {
                json!({ "kind": "circuit_opened", "api": api_name, "failures": *failure_count })
            }
            CircuitBreakerEvent::HalfOpen { api_name } => {
                json!({ "kind": "circuit_half_open", "api": api_name })
            }
            CircuitBreakerEvent::Closed { api_name } => {
                json!({ "kind": "circuit_closed", "api": api_name })
            }
            CircuitBreakerEvent::Rejected { api_name, failure_count } => {
                json!({ "kind": "circuit_rejected", "api": api_name, "failures": *failure_count })
            }
        },
        FetchEvent::Request(r) => match r {
            RequestOutcome::Success { api_name, status, attempts, duration } => json!({
                "kind": "request_success",
                "api": api_name,
                "status": *status,
                "attempts": *attempts,
                "duration_ms": clamp_u64(duration.as_millis()),
            }),
            RequestOutcome::Failure { api_name, attempts, duration } => json!({
                "kind": "request_failure",
                "api": api_name,
                "attempts": *attempts,
                "duration_ms": clamp_u64(duration.as_millis()),
            }),
            RequestOutcome::Cancelled { api_name, attempts } => json!({
                "kind": "request_cancelled",
                "api": api_name,
                "attempts": *attempts,
            }),
        },
    }
}
