//! Per-API configuration: request rate, burst, and breaker thresholds.
//!
//! The table ships with compiled-in defaults for the scholarly APIs the
//! application talks to. Unknown API names fall back to 5 req/s, burst 10,
//! threshold 5, 30 s reset. Values are tunable, not contractual.
//!
//! Environment overrides ([`ApiConfigTable::from_env`]):
//! - `NCBI_API_KEY` or `PUBMED_API_KEY` set (non-empty) raises PubMed to 10 req/s.
//! - `LIFELINE_<API>_RPS`, `LIFELINE_<API>_BURST`,
//!   `LIFELINE_<API>_FAILURE_THRESHOLD`, `LIFELINE_<API>_RESET_TIMEOUT_MS`
//!   override one field for one API. `<API>` is the API name upper-cased with
//!   `-` written as `_` (`LIFELINE_TEST_API_RPS` targets `test-api`);
//!   `DEFAULT` targets the fallback.

use crate::circuit_breaker::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Well-known API names.
pub mod apis {
    pub const DEFAULT: &str = "default";
    pub const PUBMED: &str = "pubmed";
    pub const CROSSREF: &str = "crossref";
    pub const DOAJ: &str = "doaj";
    pub const OPENROUTER: &str = "openrouter";
    pub const UNPAYWALL: &str = "unpaywall";
    pub const WILEY: &str = "wiley";
}

const ENV_PREFIX: &str = "LIFELINE_";
const PUBMED_KEY_VARS: [&str; 2] = ["NCBI_API_KEY", "PUBMED_API_KEY"];

/// Errors produced when validating configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("requests_per_second must be finite and > 0 (got {0})")]
    InvalidRate(f64),
    #[error("burst must be finite and >= 1 (got {0})")]
    InvalidBurst(f64),
    #[error("failure_threshold must be > 0")]
    InvalidFailureThreshold,
    #[error("reset_timeout must be > 0")]
    InvalidResetTimeout,
    #[error("invalid value {value:?} for {var}")]
    InvalidEnvValue { var: String, value: String },
}

/// Limits for one API name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Token refill rate.
    pub requests_per_second: f64,
    /// Bucket capacity.
    pub burst: f64,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: usize,
    /// How long the breaker stays open before a trial call.
    #[serde(rename = "reset_timeout_ms", with = "millis")]
    pub reset_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(5.0, 10.0)
    }
}

impl ApiConfig {
    /// Rate and burst with default breaker settings (threshold 5, 30 s reset).
    pub const fn new(requests_per_second: f64, burst: f64) -> Self {
        Self {
            requests_per_second,
            burst,
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRate(self.requests_per_second));
        }
        if !self.burst.is_finite() || self.burst < 1.0 {
            return Err(ConfigError::InvalidBurst(self.burst));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::InvalidResetTimeout);
        }
        Ok(())
    }

    /// Breaker settings derived from this config (single half-open trial).
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            half_open_max_calls: 1,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// API name -> [`ApiConfig`], with a fallback for unconfigured names.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfigTable {
    fallback: ApiConfig,
    apis: HashMap<String, ApiConfig>,
}

impl Default for ApiConfigTable {
    fn default() -> Self {
        Self::builtin(false)
    }
}

impl ApiConfigTable {
    /// Table holding only a fallback.
    pub fn with_fallback_only(fallback: ApiConfig) -> Result<Self, ConfigError> {
        fallback.validate()?;
        Ok(Self { fallback, apis: HashMap::new() })
    }

    /// Compiled-in defaults. `pubmed_api_key` raises PubMed from 3 to 10 req/s.
    pub fn builtin(pubmed_api_key: bool) -> Self {
        let pubmed_rate = if pubmed_api_key { 10.0 } else { 3.0 };
        let apis = [
            (apis::PUBMED, ApiConfig::new(pubmed_rate, 10.0)),
            (apis::CROSSREF, ApiConfig::new(50.0, 50.0)),
            (apis::DOAJ, ApiConfig::new(10.0, 20.0)),
            (apis::OPENROUTER, ApiConfig::new(10.0, 20.0)),
            (apis::UNPAYWALL, ApiConfig::new(10.0, 10.0)),
            (apis::WILEY, ApiConfig::new(5.0, 10.0)),
        ]
        .into_iter()
        .map(|(name, cfg)| (name.to_string(), cfg))
        .collect();
        Self { fallback: ApiConfig::default(), apis }
    }

    /// Built-in table adjusted by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Built-in table adjusted by the given `(name, value)` pairs.
    ///
    /// `DEFAULT` overrides are applied before per-API ones, so an API that is
    /// only partly overridden inherits the adjusted fallback.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

        let has_pubmed_key =
            PUBMED_KEY_VARS.iter().any(|var| vars.get(*var).is_some_and(|v| !v.trim().is_empty()));
        let mut table = Self::builtin(has_pubmed_key);

        let mut overrides: Vec<(String, Field, &str, &str)> = vars
            .iter()
            .filter_map(|(var, value)| {
                let (api, field) = split_override(var.strip_prefix(ENV_PREFIX)?)?;
                Some((api, field, var.as_str(), value.as_str()))
            })
            .collect();
        // fallback first, so unconfigured APIs start from the final fallback;
        // the sort is stable, so each group keeps key order
        overrides.sort_by_key(|(api, ..)| api != apis::DEFAULT);

        for (api, field, var, value) in overrides {
            let mut cfg = table.get(&api);
            field.apply(&mut cfg, var, value)?;
            tracing::debug!(api = %api, var = %var, "api config override from environment");
            table = table.with(&api, cfg)?;
        }
        Ok(table)
    }

    /// Insert or replace the config for `api_name`. `"default"` replaces the fallback.
    pub fn with(mut self, api_name: &str, config: ApiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if api_name == apis::DEFAULT {
            self.fallback = config;
        } else {
            self.apis.insert(api_name.to_string(), config);
        }
        Ok(self)
    }

    /// Config for `api_name`, or the fallback.
    pub fn get(&self, api_name: &str) -> ApiConfig {
        self.apis.get(api_name).copied().unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> ApiConfig {
        self.fallback
    }

    /// Explicitly configured API names, sorted.
    pub fn api_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apis.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Rps,
    Burst,
    FailureThreshold,
    ResetTimeoutMs,
}

impl Field {
    fn apply(self, cfg: &mut ApiConfig, var: &str, value: &str) -> Result<(), ConfigError> {
        let invalid =
            || ConfigError::InvalidEnvValue { var: var.to_string(), value: value.to_string() };
        let value = value.trim();
        match self {
            Field::Rps => cfg.requests_per_second = value.parse().map_err(|_| invalid())?,
            Field::Burst => cfg.burst = value.parse().map_err(|_| invalid())?,
            Field::FailureThreshold => {
                cfg.failure_threshold = value.parse().map_err(|_| invalid())?
            }
            Field::ResetTimeoutMs => {
                let ms: u64 = value.parse().map_err(|_| invalid())?;
                cfg.reset_timeout = Duration::from_millis(ms);
            }
        }
        Ok(())
    }
}

fn split_override(rest: &str) -> Option<(String, Field)> {
    const SUFFIXES: [(&str, Field); 4] = [
        ("_FAILURE_THRESHOLD", Field::FailureThreshold),
        ("_RESET_TIMEOUT_MS", Field::ResetTimeoutMs),
        ("_BURST", Field::Burst),
        ("_RPS", Field::Rps),
    ];
    SUFFIXES.iter().find_map(|(suffix, field)| {
        let api = rest.strip_suffix(suffix)?;
        if api.is_empty() {
            return None;
        }
        Some((api.to_ascii_lowercase().replace('_', "-"), *field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults() {
        let table = ApiConfigTable::builtin(false);
        assert_eq!(table.get(apis::PUBMED).requests_per_second, 3.0);
        assert_eq!(table.get(apis::CROSSREF), ApiConfig::new(50.0, 50.0));
        assert_eq!(table.get(apis::DOAJ).burst, 20.0);
        assert_eq!(table.get("never-heard-of-it"), ApiConfig::new(5.0, 10.0));
        assert_eq!(table.get("never-heard-of-it").failure_threshold, 5);
        assert_eq!(table.get("never-heard-of-it").reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn pubmed_key_raises_rate() {
        let table = ApiConfigTable::from_vars([("NCBI_API_KEY", "abc123")]).unwrap();
        assert_eq!(table.get(apis::PUBMED).requests_per_second, 10.0);

        let blank = ApiConfigTable::from_vars([("PUBMED_API_KEY", "  ")]).unwrap();
        assert_eq!(blank.get(apis::PUBMED).requests_per_second, 3.0);
    }

    #[test]
    fn env_overrides_individual_fields() {
        let table = ApiConfigTable::from_vars([
            ("LIFELINE_TEST_API_RPS", "1"),
            ("LIFELINE_TEST_API_BURST", "1"),
            ("LIFELINE_CROSSREF_FAILURE_THRESHOLD", "3"),
            ("LIFELINE_DEFAULT_RESET_TIMEOUT_MS", "5000"),
            ("UNRELATED", "x"),
        ])
        .unwrap();

        let test_api = table.get("test-api");
        assert_eq!(test_api.requests_per_second, 1.0);
        assert_eq!(test_api.burst, 1.0);
        assert_eq!(table.get(apis::CROSSREF).failure_threshold, 3);
        assert_eq!(table.get(apis::CROSSREF).requests_per_second, 50.0);
        assert_eq!(table.fallback().reset_timeout, Duration::from_secs(5));
    }

    #[test]
    fn fallback_overrides_reach_every_unconfigured_api() {
        let table = ApiConfigTable::from_vars([
            ("LIFELINE_DEFAULT_FAILURE_THRESHOLD", "3"),
            ("LIFELINE_ARXIV_RPS", "2"),
            ("LIFELINE_ZOTERO_RPS", "2"),
        ])
        .unwrap();

        assert_eq!(table.fallback().failure_threshold, 3);
        for api in ["arxiv", "zotero"] {
            let cfg = table.get(api);
            assert_eq!(cfg.requests_per_second, 2.0, "{api}");
            assert_eq!(cfg.failure_threshold, 3, "{api} keeps the overridden fallback");
            assert_eq!(cfg.burst, 10.0, "{api}");
        }
    }

    #[test]
    fn malformed_env_value_is_an_error() {
        let err = ApiConfigTable::from_vars([("LIFELINE_DOAJ_RPS", "fast")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnvValue { var: "LIFELINE_DOAJ_RPS".into(), value: "fast".into() }
        );

        let err = ApiConfigTable::from_vars([("LIFELINE_DOAJ_RPS", "0")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidRate(0.0));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(ApiConfig::new(f64::NAN, 1.0).validate().is_err());
        assert_eq!(ApiConfig::new(1.0, 0.5).validate(), Err(ConfigError::InvalidBurst(0.5)));
        assert_eq!(
            ApiConfig::new(1.0, 1.0).with_failure_threshold(0).validate(),
            Err(ConfigError::InvalidFailureThreshold)
        );
        assert_eq!(
            ApiConfig::new(1.0, 1.0).with_reset_timeout(Duration::ZERO).validate(),
            Err(ConfigError::InvalidResetTimeout)
        );
    }

    #[test]
    fn api_config_deserializes_with_millis() {
        let cfg: ApiConfig = serde_json::from_str(
            r#"{"requests_per_second":2.5,"burst":4,"failure_threshold":3,"reset_timeout_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(cfg.requests_per_second, 2.5);
        assert_eq!(cfg.burst, 4.0);
        assert_eq!(cfg.reset_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn api_names_are_sorted() {
        let table = ApiConfigTable::builtin(false);
        assert_eq!(
            table.api_names(),
            vec!["crossref", "doaj", "openrouter", "pubmed", "unpaywall", "wiley"]
        );
    }
}
