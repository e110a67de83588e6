//! Error types for resilient fetches
use std::time::Duration;

/// Failure to get any response from the remote side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// Could not establish a connection (DNS, refused, TLS handshake).
    #[error("connection failed: {0}")]
    Connect(String),
    /// The connection failed after it was established (reset, truncated body).
    #[error("network error: {0}")]
    Network(String),
    /// The request itself is invalid; retrying cannot help.
    #[error("invalid request: {0}")]
    Request(String),
}

impl TransportError {
    /// Everything except an invalid request is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() || err.is_redirect() {
            TransportError::Request(message)
        } else if err.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Network(message)
        }
    }
}

/// Unified error type for resilient fetches
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The circuit breaker is open; no attempt was made.
    #[error("circuit breaker open for {api_name} ({failures} failures, open for {open_for:?})")]
    CircuitOpen { api_name: String, failures: usize, open_for: Duration },
    /// Network failure, after retries were exhausted or immediately when not retryable.
    #[error("request to {api_name} failed after {attempts} attempt(s): {source}")]
    Transport {
        api_name: String,
        attempts: usize,
        #[source]
        source: TransportError,
    },
    /// A retryable status persisted through every attempt. Carries the last response.
    #[error("{api_name} returned HTTP {status} on all {attempts} attempt(s)")]
    RetryableStatus {
        api_name: String,
        status: u16,
        attempts: usize,
        response: Box<reqwest::Response>,
    },
    /// Non-success status, raised by the strict helpers only.
    #[error("HTTP {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },
    /// The attempt loop ended without an outcome.
    #[error("retries exhausted for {api_name} after {attempts} attempt(s)")]
    RetriesExhausted { api_name: String, attempts: usize },
    /// The caller's cancellation token fired.
    #[error("request to {api_name} was cancelled")]
    Cancelled { api_name: String },
    /// The URL given to a convenience helper did not parse; no attempt was made.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The request body is a stream and cannot be replayed.
    #[error("request body for {url} cannot be cloned for retries")]
    UncloneableRequest { url: String },
    /// Reading the response body failed.
    #[error("failed to read response body from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The response body was not the expected JSON.
    #[error("failed to decode JSON from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Check if this is a circuit-open rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FetchError::CircuitOpen { .. })
    }

    /// Check if this is a transport failure
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    /// Check if the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }

    /// Whether the underlying failure was transient (retryable transport error
    /// or retryable status) and retries simply ran out.
    pub fn is_retryable_failure(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => source.is_retryable(),
            FetchError::RetryableStatus { .. } | FetchError::RetriesExhausted { .. } => true,
            _ => false,
        }
    }

    /// HTTP status, when the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RetryableStatus { status, .. } | FetchError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Number of network attempts made, when known.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            FetchError::Transport { attempts, .. }
            | FetchError::RetryableStatus { attempts, .. }
            | FetchError::RetriesExhausted { attempts, .. } => Some(*attempts),
            FetchError::CircuitOpen { .. }
            | FetchError::UncloneableRequest { .. }
            | FetchError::InvalidUrl { .. } => Some(0),
            _ => None,
        }
    }

    /// Take the last response out of a `RetryableStatus` error.
    pub fn into_response(self) -> Option<reqwest::Response> {
        match self {
            FetchError::RetryableStatus { response, .. } => Some(*response),
            _ => None,
        }
    }
}

/// Errors from the breaker registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No breaker exists for this API name.
    #[error("circuit breaker '{api_name}' not found")]
    NotFound { api_name: String },
}
