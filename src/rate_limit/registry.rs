use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::rate_limit::TokenBucket;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Per-API token buckets, created lazily on first use.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    clock: Arc<dyn Clock>,
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiterRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, buckets: RwLock::default() }
    }

    /// Bucket for `api_name`, creating a full one from `config` if absent.
    ///
    /// Concurrent first uses of the same name observe the same bucket.
    pub fn get_or_insert(&self, api_name: &str, config: &ApiConfig) -> Arc<TokenBucket> {
        if let Some(bucket) = self.get(api_name) {
            return bucket;
        }
        let mut map = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(api_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    api = %api_name,
                    rps = config.requests_per_second,
                    burst = config.burst,
                    "rate limiter created"
                );
                Arc::new(TokenBucket::new(api_name, config, self.clock.clone()))
            })
            .clone()
    }

    pub fn get(&self, api_name: &str) -> Option<Arc<TokenBucket>> {
        let map = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        map.get(api_name).cloned()
    }

    /// Whole tokens available per created bucket, floored, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let map = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .map(|(name, bucket)| (name.clone(), bucket.available_tokens().floor() as u64))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
