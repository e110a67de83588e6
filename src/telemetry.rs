//! Telemetry for resilient fetches.
//!
//! The orchestrator emits a [`FetchEvent`] for every rate-limit wait, scheduled
//! retry, breaker transition or rejection, and terminal outcome. Events flow
//! through a [`TelemetrySink`], which can log, collect, or forward them.
//!
//! # Event Types
//!
//! - **Rate limit**: `Waited`
//! - **Retry**: `Scheduled`, `Exhausted`
//! - **Circuit Breaker**: `Opened`, `HalfOpen`, `Closed`, `Rejected`
//! - **Request**: `Success`, `Failure`, `Cancelled`
//!
//! # Telemetry Sinks
//!
//! The `TelemetrySink` trait defines how events are consumed. It's implemented
//! as a `tower::Service<FetchEvent>` for composability. Emission is best-effort:
//! a sink error never fails a fetch.

pub mod events;
pub mod sinks;

pub use events::{
    event_to_json, CircuitBreakerEvent, FetchEvent, RateLimitEvent, RequestOutcome, RetryEvent,
};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
