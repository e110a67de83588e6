#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # lifeline
//!
//! Resilient outbound HTTP for services that depend on rate-limited,
//! occasionally flaky third-party APIs.
//!
//! ## Features
//!
//! - **Per-API token buckets** with lazy refill and burst capacity
//! - **Per-API circuit breakers** (closed → open → half-open) on lock-free atomics
//! - **Retries** with exponential backoff, proportional jitter and a delay cap
//! - **Per-attempt timeouts** and cooperative cancellation
//! - **Stats** for every API name seen, serialisable with serde
//! - **Telemetry** through `tower::Service` sinks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lifeline::{FetchOptions, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ResilientClient::from_env()?;
//!
//!     let works: serde_json::Value = client
//!         .fetch_json(
//!             reqwest::Request::new(
//!                 reqwest::Method::GET,
//!                 "https://api.crossref.org/works/10.1038/nature12373".parse()?,
//!             ),
//!             &FetchOptions::for_api("crossref"),
//!         )
//!         .await?;
//!     println!("{}", works["message"]["title"]);
//!
//!     println!("{}", serde_json::to_string_pretty(&client.stats())?);
//!     Ok(())
//! }
//! ```
//!
//! State is process-local: limits and breaker state reset on restart, and
//! separate processes enforce independent limits.

pub mod backoff;
pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod jitter;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
pub mod stats;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use backoff::Backoff;
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, Permit, Rejection,
};
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use client::{FetchOptions, ResilientClient, ResilientClientBuilder};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ApiConfig, ApiConfigTable, ConfigError};
pub use error::{FetchError, RegistryError, TransportError};
pub use jitter::{FixedRandom, Jitter, RandomSource, SeededRandom, ThreadRandom};
pub use rate_limit::{Decision, RateLimiterRegistry, TokenBucket};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stats::HttpClientStats;
pub use telemetry::{FetchEvent, LogSink, MemorySink, NullSink, TelemetrySink};
pub use transport::Transport;
pub use tokio_util::sync::CancellationToken;
