use super::events::FetchEvent;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes fetch events.
pub trait TelemetrySink:
    tower::Service<FetchEvent, Response = (), Error = Self::SinkError> + Clone + Send + Sync + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: FetchEvent)
where
    S: tower::Service<FetchEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

type Ready = Pin<Box<dyn std::future::Future<Output = Result<(), Infallible>> + Send>>;

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<FetchEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: FetchEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<FetchEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: FetchEvent) -> Self::Future {
        tracing::debug!(api = %event.api_name(), event = %event, "fetch_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A telemetry sink that stores events in memory, evicting the oldest at capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<FetchEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FetchEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<FetchEvent> {
        self.lock().clone()
    }

    /// Events concerning one API name.
    pub fn events_for(&self, api_name: &str) -> Vec<FetchEvent> {
        self.lock().iter().filter(|e| e.api_name() == api_name).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<FetchEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: FetchEvent) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
