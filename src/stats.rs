//! Read-only view of per-API limiter and breaker state.

use crate::circuit_breaker::BreakerSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;

/// Snapshot returned by [`ResilientClient::stats`](crate::ResilientClient::stats).
///
/// Each entry is read independently, so under concurrent traffic the snapshot
/// may mix moments across API names.
///
/// ```rust
/// use lifeline::{BreakerSnapshot, CircuitState, HttpClientStats};
///
/// let mut stats = HttpClientStats::default();
/// stats.rate_limiters.insert("crossref".into(), 49);
/// stats
///     .circuit_breakers
///     .insert("crossref".into(), BreakerSnapshot { state: CircuitState::HalfOpen, failures: 5 });
///
/// let json = serde_json::to_value(&stats).unwrap();
/// assert_eq!(json["rate_limiters"]["crossref"], 49);
/// assert_eq!(json["circuit_breakers"]["crossref"]["state"], "half-open");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HttpClientStats {
    /// Whole tokens available, floored, keyed by API name.
    pub rate_limiters: BTreeMap<String, u64>,
    /// Breaker state and consecutive failures, keyed by API name.
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
}

impl HttpClientStats {
    /// API names known to either registry, sorted.
    pub fn api_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .rate_limiters
            .keys()
            .chain(self.circuit_breakers.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
