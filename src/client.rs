//! Resilient HTTP client: rate limiting, circuit breaking and retries per API.
//!
//! A fetch runs through three guards in order:
//!
//! 1. **Circuit breaker** for the API name. An open circuit rejects the call
//!    with [`FetchError::CircuitOpen`] before anything touches the network.
//! 2. **Token bucket** for the API name. When empty, the call waits for a
//!    token; retries of the same call do not take another token.
//! 3. **Attempt loop**: up to `max_retries + 1` attempts, each bounded by
//!    [`FetchOptions::timeout`], with exponential backoff and jitter between
//!    attempts. Transport errors and retryable statuses are retried; any other
//!    status is handed back to the caller untouched.
//!
//! The breaker records exactly one outcome per admitted call: success for a
//! 2xx response, failure when retries run out or a transport error cannot be
//! retried. Non-retryable statuses and cancellations record nothing.
//!
//! Registries live inside the client, so two clients never share limits and a
//! fresh client starts from full buckets and closed breakers.

use crate::circuit_breaker::{CircuitState, Permit};
use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{apis, ApiConfig, ApiConfigTable};
use crate::error::{FetchError, RegistryError, TransportError};
use crate::jitter::{RandomSource, ThreadRandom};
use crate::rate_limit::RateLimiterRegistry;
use crate::retry::{AttemptOutcome, CallAttempt, RetryPolicy};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::stats::HttpClientStats;
use crate::telemetry::{
    emit_best_effort, CircuitBreakerEvent, FetchEvent, LogSink, RateLimitEvent, RequestOutcome,
    RetryEvent, TelemetrySink,
};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Longest error body kept by [`ResilientClient::fetch_checked`], in characters.
pub const ERROR_BODY_LIMIT: usize = 300;

/// Per-call options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// API name selecting the rate limiter, breaker and config. Defaults to `"default"`.
    pub api_name: String,
    /// Overrides the client's retry policy for this call.
    pub retry: Option<RetryPolicy>,
    /// Bounds a single attempt, not the whole retry sequence.
    pub timeout: Duration,
    pub skip_rate_limit: bool,
    /// Neither consult nor update the breaker.
    pub skip_circuit_breaker: bool,
    /// Aborts the rate-limit wait, an in-flight attempt, or a backoff sleep.
    pub cancel: Option<CancellationToken>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            api_name: apis::DEFAULT.to_string(),
            retry: None,
            timeout: DEFAULT_TIMEOUT,
            skip_rate_limit: false,
            skip_circuit_breaker: false,
            cancel: None,
        }
    }
}

impl FetchOptions {
    /// Default options for `api_name`.
    pub fn for_api(api_name: impl Into<String>) -> Self {
        Self { api_name: api_name.into(), ..Self::default() }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }

    pub fn skip_circuit_breaker(mut self) -> Self {
        self.skip_circuit_breaker = true;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

struct Inner<T, S> {
    transport: T,
    configs: ApiConfigTable,
    rate_limiters: RateLimiterRegistry,
    breakers: CircuitBreakerRegistry,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    random: Arc<dyn RandomSource>,
    retry: RetryPolicy,
    sink: S,
}

/// Outbound HTTP client with per-API rate limiting, circuit breaking and retries.
///
/// Cheap to clone; clones share registries and transport.
pub struct ResilientClient<T = reqwest::Client, S = LogSink> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for ResilientClient<T, S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, S> std::fmt::Debug for ResilientClient<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("configs", &self.inner.configs)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl Default for ResilientClient {
    fn default() -> Self {
        ResilientClient::builder(reqwest::Client::new()).build()
    }
}

impl ResilientClient {
    /// Client over a default `reqwest::Client`, configured from the environment.
    pub fn from_env() -> Result<Self, crate::config::ConfigError> {
        let configs = ApiConfigTable::from_env()?;
        Ok(ResilientClient::builder(reqwest::Client::new()).configs(configs).build())
    }
}

impl<T: Transport> ResilientClient<T, LogSink> {
    /// Start building a client around `transport`.
    pub fn builder(transport: T) -> ResilientClientBuilder<T, LogSink> {
        ResilientClientBuilder::new(transport)
    }
}

/// Builder for [`ResilientClient`].
pub struct ResilientClientBuilder<T, S> {
    transport: T,
    sink: S,
    configs: ApiConfigTable,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    random: Arc<dyn RandomSource>,
    retry: RetryPolicy,
}

impl<T: Transport> ResilientClientBuilder<T, LogSink> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            sink: LogSink,
            configs: ApiConfigTable::default(),
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(TokioSleeper),
            random: Arc::new(ThreadRandom),
            retry: RetryPolicy::default(),
        }
    }
}

impl<T, S> ResilientClientBuilder<T, S>
where
    T: Transport,
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Per-API limits; defaults to the built-in table.
    pub fn configs(mut self, configs: ApiConfigTable) -> Self {
        self.configs = configs;
        self
    }

    /// Time source for token refill and breaker cool-down.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// How rate-limit waits and backoff delays suspend.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Sample source for backoff jitter.
    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Arc::new(random);
        self
    }

    /// Retry policy used when a call does not bring its own.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Attach a telemetry sink.
    pub fn sink<NewSink>(self, sink: NewSink) -> ResilientClientBuilder<T, NewSink>
    where
        NewSink: TelemetrySink,
        NewSink::Future: Send + 'static,
    {
        ResilientClientBuilder {
            transport: self.transport,
            sink,
            configs: self.configs,
            clock: self.clock,
            sleeper: self.sleeper,
            random: self.random,
            retry: self.retry,
        }
    }

    pub fn build(self) -> ResilientClient<T, S> {
        ResilientClient {
            inner: Arc::new(Inner {
                transport: self.transport,
                rate_limiters: RateLimiterRegistry::new(self.clock.clone()),
                breakers: CircuitBreakerRegistry::new(self.clock.clone()),
                configs: self.configs,
                clock: self.clock,
                sleeper: self.sleeper,
                random: self.random,
                retry: self.retry,
                sink: self.sink,
            }),
        }
    }
}

/// Run `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match cancel {
        None => Some(fut.await),
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = fut => Some(out),
        },
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

impl<T, S> ResilientClient<T, S>
where
    T: Transport,
    S: TelemetrySink,
    S::Future: Send + 'static,
{
    /// Send `request` through the breaker, rate limiter and retry loop for
    /// `options.api_name`.
    ///
    /// Returns the response unconsumed for any 2xx status and for statuses the
    /// retry policy does not consider retryable.
    ///
    /// # Errors
    /// - [`FetchError::CircuitOpen`] when the breaker rejects the call (no attempt made).
    /// - [`FetchError::Transport`] when the last attempt failed at the network level.
    /// - [`FetchError::RetryableStatus`] when every attempt returned a retryable status.
    /// - [`FetchError::Cancelled`] when the cancellation token fired.
    /// - [`FetchError::UncloneableRequest`] for streaming request bodies.
    pub async fn fetch(
        &self,
        request: reqwest::Request,
        options: &FetchOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let api = options.api_name.as_str();
        let inner = &*self.inner;
        let config = inner.configs.get(api);
        let policy = options.retry.as_ref().unwrap_or(&inner.retry);
        let cancel = options.cancel.as_ref();
        let started_ms = inner.clock.now_millis();

        if request.body().is_some_and(|body| body.as_bytes().is_none()) {
            return Err(FetchError::UncloneableRequest { url: request.url().to_string() });
        }

        let mut permit = self.admit(api, &config, options).await?;

        if !options.skip_rate_limit {
            let bucket = inner.rate_limiters.get_or_insert(api, &config);
            match until_cancelled(cancel, bucket.acquire(inner.sleeper.as_ref())).await {
                None => return Err(self.cancelled(api, 0).await),
                Some(wait) if !wait.is_zero() => {
                    self.emit(FetchEvent::RateLimit(RateLimitEvent::Waited {
                        api_name: api.to_string(),
                        wait,
                    }))
                    .await;
                }
                Some(_) => {}
            }
        }

        let max_retries = policy.max_retries();
        for attempt in 0..=max_retries {
            let attempts = attempt + 1;
            let Some(attempt_request) = request.try_clone() else {
                return Err(FetchError::UncloneableRequest { url: request.url().to_string() });
            };
            let attempt_started_ms = inner.clock.now_millis();
            let send = tokio::time::timeout(options.timeout, inner.transport.execute(attempt_request));
            let result = match until_cancelled(cancel, send).await {
                None => return Err(self.cancelled(api, attempts).await),
                Some(Ok(result)) => result,
                Some(Err(_elapsed)) => Err(TransportError::Timeout),
            };

            let outcome = match &result {
                Ok(response) if response.status().is_success() => {
                    AttemptOutcome::Success { status: response.status().as_u16() }
                }
                Ok(response) if policy.is_retryable_status(response.status().as_u16()) => {
                    AttemptOutcome::RetryableFailure {
                        reason: format!("HTTP {}", response.status().as_u16()),
                    }
                }
                Ok(response) => AttemptOutcome::FatalFailure {
                    reason: format!("HTTP {}", response.status().as_u16()),
                },
                Err(err) if err.is_retryable() => {
                    AttemptOutcome::RetryableFailure { reason: err.to_string() }
                }
                Err(err) => AttemptOutcome::FatalFailure { reason: err.to_string() },
            };
            let record = CallAttempt { attempt, started_at_ms: attempt_started_ms, outcome };
            tracing::debug!(
                api = %api,
                attempt = record.attempt,
                started_at_ms = record.started_at_ms,
                outcome = %record.outcome,
                "attempt finished"
            );

            let retries_left = attempt < max_retries;
            match (result, record.outcome) {
                (Ok(response), AttemptOutcome::Success { status }) => {
                    self.settle(api, permit.take(), true).await;
                    self.finished(api, status, attempts, started_ms).await;
                    return Ok(response);
                }
                (Ok(response), AttemptOutcome::FatalFailure { .. }) => {
                    // passed through to the caller; the breaker is left alone
                    drop(permit.take());
                    let status = response.status().as_u16();
                    self.finished(api, status, attempts, started_ms).await;
                    return Ok(response);
                }
                (Ok(response), AttemptOutcome::RetryableFailure { .. }) if !retries_left => {
                    let status = response.status().as_u16();
                    tracing::warn!(api = %api, status, attempts, "retries exhausted");
                    self.settle(api, permit.take(), false).await;
                    self.exhausted(api, attempts, started_ms).await;
                    return Err(FetchError::RetryableStatus {
                        api_name: api.to_string(),
                        status,
                        attempts,
                        response: Box::new(response),
                    });
                }
                (Err(source), outcome) if !retries_left || !outcome.is_retryable() => {
                    tracing::warn!(
                        api = %api,
                        attempts,
                        error = %source,
                        retryable = source.is_retryable(),
                        "request failed"
                    );
                    self.settle(api, permit.take(), false).await;
                    if source.is_retryable() {
                        self.exhausted(api, attempts, started_ms).await;
                    } else {
                        self.failed(api, attempts, started_ms).await;
                    }
                    return Err(FetchError::Transport {
                        api_name: api.to_string(),
                        attempts,
                        source,
                    });
                }
                (leftover, outcome) => {
                    drop(leftover);
                    let delay = policy.delay_for(attempt, inner.random.as_ref());
                    let reason = outcome.to_string();
                    tracing::warn!(
                        api = %api,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "retrying request"
                    );
                    self.emit(FetchEvent::Retry(RetryEvent::Scheduled {
                        api_name: api.to_string(),
                        attempt,
                        delay,
                        reason,
                    }))
                    .await;
                    if until_cancelled(cancel, inner.sleeper.sleep(delay)).await.is_none() {
                        return Err(self.cancelled(api, attempts).await);
                    }
                }
            }
        }

        let attempts = max_retries + 1;
        self.settle(api, permit.take(), false).await;
        self.failed(api, attempts, started_ms).await;
        Err(FetchError::RetriesExhausted { api_name: api.to_string(), attempts })
    }

    /// Like [`fetch`](Self::fetch), but any non-2xx response becomes
    /// [`FetchError::Status`] carrying up to 300 characters of the body.
    pub async fn fetch_checked(
        &self,
        request: reqwest::Request,
        options: &FetchOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let response = match self.fetch(request, options).await {
            Ok(response) => response,
            Err(FetchError::RetryableStatus { response, .. }) => *response,
            Err(err) => return Err(err),
        };
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(FetchError::Status { status, url, body: truncate_chars(&body, ERROR_BODY_LIMIT) })
    }

    /// [`fetch_checked`](Self::fetch_checked), then decode the body as JSON.
    pub async fn fetch_json<D: DeserializeOwned>(
        &self,
        request: reqwest::Request,
        options: &FetchOptions,
    ) -> Result<D, FetchError> {
        let response = self.fetch_checked(request, options).await?;
        let url = response.url().to_string();
        let bytes =
            response.bytes().await.map_err(|source| FetchError::Body { url: url.clone(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode { url, source })
    }

    /// GET `url` through [`fetch`](Self::fetch).
    ///
    /// # Errors
    /// [`FetchError::InvalidUrl`] when `url` does not parse, plus everything
    /// [`fetch`](Self::fetch) returns.
    pub async fn get(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Response, FetchError> {
        let url = reqwest::Url::parse(url)
            .map_err(|err| FetchError::InvalidUrl { url: url.to_string(), reason: err.to_string() })?;
        self.fetch(reqwest::Request::new(reqwest::Method::GET, url), options).await
    }

    /// Tokens and breaker state for every API name used so far.
    pub fn stats(&self) -> HttpClientStats {
        HttpClientStats {
            rate_limiters: self.inner.rate_limiters.snapshot(),
            circuit_breakers: self.inner.breakers.snapshot(),
        }
    }

    /// Force the breaker for `api_name` closed.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] if no call has used `api_name` yet.
    pub fn reset_circuit_breaker(&self, api_name: &str) -> Result<(), RegistryError> {
        self.inner.breakers.reset(api_name)
    }

    /// Tokens currently available for `api_name`, if its bucket exists.
    pub fn available_tokens(&self, api_name: &str) -> Option<f64> {
        self.inner.rate_limiters.get(api_name).map(|bucket| bucket.available_tokens())
    }

    /// Breaker state for `api_name`, if its breaker exists.
    pub fn circuit_state(&self, api_name: &str) -> Option<CircuitState> {
        self.inner.breakers.get(api_name).map(|breaker| breaker.state())
    }

    /// Effective config for `api_name`.
    pub fn config_for(&self, api_name: &str) -> ApiConfig {
        self.inner.configs.get(api_name)
    }

    async fn admit(
        &self,
        api: &str,
        config: &ApiConfig,
        options: &FetchOptions,
    ) -> Result<Option<Permit>, FetchError> {
        if options.skip_circuit_breaker {
            return Ok(None);
        }
        let breaker = self.inner.breakers.get_or_insert(api, config);
        match breaker.try_acquire() {
            Ok(permit) => {
                if permit.opened_half_open() {
                    self.emit(FetchEvent::CircuitBreaker(CircuitBreakerEvent::HalfOpen {
                        api_name: api.to_string(),
                    }))
                    .await;
                }
                Ok(Some(permit))
            }
            Err(rejection) => {
                tracing::warn!(
                    api = %api,
                    failures = rejection.failures,
                    open_for_ms = rejection.open_for.as_millis() as u64,
                    "circuit breaker open; request rejected"
                );
                self.emit(FetchEvent::CircuitBreaker(CircuitBreakerEvent::Rejected {
                    api_name: api.to_string(),
                    failure_count: rejection.failures,
                }))
                .await;
                Err(FetchError::CircuitOpen {
                    api_name: api.to_string(),
                    failures: rejection.failures,
                    open_for: rejection.open_for,
                })
            }
        }
    }

    async fn settle(&self, api: &str, permit: Option<Permit>, success: bool) {
        let Some(permit) = permit else { return };
        let transition =
            if success { permit.record_success() } else { permit.record_failure() };
        let event = match transition {
            Some(CircuitState::Open) => CircuitBreakerEvent::Opened {
                api_name: api.to_string(),
                failure_count: self.inner.breakers.get(api).map_or(0, |b| b.failure_count()),
            },
            Some(CircuitState::Closed) => CircuitBreakerEvent::Closed { api_name: api.to_string() },
            Some(CircuitState::HalfOpen) | None => return,
        };
        self.emit(FetchEvent::CircuitBreaker(event)).await;
    }

    async fn finished(&self, api: &str, status: u16, attempts: usize, started_ms: u64) {
        let duration = self.elapsed_since(started_ms);
        self.emit(FetchEvent::Request(RequestOutcome::Success {
            api_name: api.to_string(),
            status,
            attempts,
            duration,
        }))
        .await;
    }

    async fn exhausted(&self, api: &str, attempts: usize, started_ms: u64) {
        self.emit(FetchEvent::Retry(RetryEvent::Exhausted { api_name: api.to_string(), attempts }))
            .await;
        self.failed(api, attempts, started_ms).await;
    }

    async fn failed(&self, api: &str, attempts: usize, started_ms: u64) {
        let duration = self.elapsed_since(started_ms);
        self.emit(FetchEvent::Request(RequestOutcome::Failure {
            api_name: api.to_string(),
            attempts,
            duration,
        }))
        .await;
    }

    async fn cancelled(&self, api: &str, attempts: usize) -> FetchError {
        tracing::info!(api = %api, attempts, "request cancelled");
        self.emit(FetchEvent::Request(RequestOutcome::Cancelled {
            api_name: api.to_string(),
            attempts,
        }))
        .await;
        FetchError::Cancelled { api_name: api.to_string() }
    }

    fn elapsed_since(&self, started_ms: u64) -> Duration {
        Duration::from_millis(self.inner.clock.now_millis().saturating_sub(started_ms))
    }

    async fn emit(&self, event: FetchEvent) {
        emit_best_effort(self.inner.sink.clone(), event).await;
    }
}
