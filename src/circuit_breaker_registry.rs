//! Registry of per-API circuit breakers.
//!
//! Breakers are created on first use from the API's config and live as long as
//! the registry. Inspection and manual reset go through the registry by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::error::RegistryError;
use tracing::warn;

/// In-memory registry backed by an RwLock.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    clock: Arc<dyn Clock>,
    inner: RwLock<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, inner: RwLock::default() }
    }

    /// Breaker for `api_name`, creating a closed one from `config` if absent.
    pub fn get_or_insert(&self, api_name: &str, config: &ApiConfig) -> CircuitBreaker {
        if let Some(breaker) = self.get(api_name) {
            return breaker;
        }
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(api_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    api = %api_name,
                    threshold = config.failure_threshold,
                    reset_timeout_ms = config.reset_timeout.as_millis() as u64,
                    "circuit breaker created"
                );
                CircuitBreaker::with_clock(api_name, config.breaker_config(), self.clock.clone())
            })
            .clone()
    }

    /// Get a breaker by name.
    pub fn get(&self, api_name: &str) -> Option<CircuitBreaker> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(api_name).cloned()
    }

    /// Reset a breaker by name, erroring if it was never created.
    pub fn reset(&self, api_name: &str) -> Result<(), RegistryError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match guard.get(api_name) {
            Some(breaker) => {
                breaker.reset();
                Ok(())
            }
            None => {
                warn!(api = %api_name, "reset requested for unknown circuit breaker");
                Err(RegistryError::NotFound { api_name: api_name.to_string() })
            }
        }
    }

    /// Snapshot breaker states sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.iter().map(|(k, v)| (k.clone(), v.snapshot())).collect()
    }
}
