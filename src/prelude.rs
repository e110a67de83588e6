//! Convenient re-exports for common lifeline types.
pub use crate::{
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    client::{FetchOptions, ResilientClient, ResilientClientBuilder},
    config::{apis, ApiConfig, ApiConfigTable, ConfigError},
    error::{FetchError, RegistryError, TransportError},
    jitter::Jitter,
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    stats::HttpClientStats,
    transport::Transport,
};
