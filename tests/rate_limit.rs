mod common;

use common::test_helpers::{get, Harness, Reply};
use lifeline::telemetry::{FetchEvent, RateLimitEvent};
use lifeline::{ApiConfig, ApiConfigTable, Clock, Decision, FetchOptions, ManualClock, TokenBucket};
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "https://rate.example.org/ping";

fn single(api: &str, rps: f64, burst: f64) -> Harness {
    let table = ApiConfigTable::default().with(api, ApiConfig::new(rps, burst)).unwrap();
    Harness::new(table, Vec::new(), Reply::Status(200))
}

#[tokio::test]
async fn back_to_back_calls_are_spaced_by_the_refill_interval() {
    let h = single("test-api", 1.0, 1.0);
    let options = FetchOptions::for_api("test-api");

    h.client.fetch(get(URL), &options).await.unwrap();
    h.client.fetch(get(URL), &options).await.unwrap();

    let started = h.transport.started_at();
    assert_eq!(started.len(), 2);
    assert!(started[1] - started[0] >= 1000, "second call started after {:?}", started);
    assert!(h.sink.events().contains(&FetchEvent::RateLimit(RateLimitEvent::Waited {
        api_name: "test-api".into(),
        wait: Duration::from_secs(1),
    })));
}

#[tokio::test]
async fn burst_is_served_immediately_then_calls_wait() {
    let h = single("burst", 2.0, 5.0);
    let options = FetchOptions::for_api("burst");

    for _ in 0..5 {
        h.client.fetch(get(URL), &options).await.unwrap();
    }
    assert!(h.sleeper.calls().is_empty(), "burst capacity must not wait");

    h.client.fetch(get(URL), &options).await.unwrap();
    assert_eq!(h.sleeper.calls(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn retries_do_not_take_extra_tokens() {
    let table = ApiConfigTable::default().with("one", ApiConfig::new(1.0, 1.0)).unwrap();
    let h = Harness::new(table, vec![Reply::Status(503), Reply::Status(503)], Reply::Status(200));

    h.client.fetch(get(URL), &FetchOptions::for_api("one")).await.unwrap();

    assert_eq!(h.transport.calls(), 3);
    // only backoff sleeps; the single token covered all attempts
    assert_eq!(h.sleeper.calls(), vec![Duration::from_millis(1000), Duration::from_millis(2000)]);
}

#[tokio::test]
async fn skipping_rate_limit_never_waits_or_creates_a_bucket() {
    let h = single("free", 1.0, 1.0);
    let options = FetchOptions::for_api("free").skip_rate_limit();
    for _ in 0..5 {
        h.client.fetch(get(URL), &options).await.unwrap();
    }
    assert!(h.sleeper.calls().is_empty());
    assert!(h.client.available_tokens("free").is_none());
}

#[tokio::test]
async fn api_names_are_isolated() {
    let table = ApiConfigTable::default()
        .with("a", ApiConfig::new(1.0, 1.0))
        .unwrap()
        .with("b", ApiConfig::new(1.0, 1.0))
        .unwrap();
    let h = Harness::new(table, Vec::new(), Reply::Status(200));

    h.client.fetch(get(URL), &FetchOptions::for_api("a")).await.unwrap();
    h.client.fetch(get(URL), &FetchOptions::for_api("b")).await.unwrap();
    assert!(h.sleeper.calls().is_empty(), "draining a must not affect b");
}

#[test]
fn zero_elapsed_acquisitions_never_exceed_burst() {
    let clock = ManualClock::starting_at(5_000);
    let bucket = TokenBucket::new("bounds", &ApiConfig::new(3.0, 4.0), Arc::new(clock.clone()));

    let allowed = (0..20).filter(|_| bucket.try_acquire().is_allowed()).count();
    assert_eq!(allowed, 4);
    assert!(bucket.available_tokens() >= 0.0);
    assert!(bucket.available_tokens() <= 4.0);
}

#[test]
fn refill_is_linear_until_capped() {
    let clock = ManualClock::starting_at(0);
    let bucket = TokenBucket::new("refill", &ApiConfig::new(4.0, 10.0), Arc::new(clock.clone()));
    while bucket.try_acquire().is_allowed() {}
    let t0 = clock.now_millis();

    for dt in [0u64, 250, 500, 1_000, 2_000, 2_500, 10_000] {
        clock.set(t0 + dt);
        let expected = (dt as f64 / 1000.0 * 4.0).min(10.0);
        assert!(
            (bucket.available_tokens() - expected).abs() < 1e-9,
            "after {dt}ms expected {expected}, got {}",
            bucket.available_tokens()
        );
    }
}

#[test]
fn denied_decision_reports_time_to_next_token() {
    let clock = ManualClock::starting_at(0);
    let bucket = TokenBucket::new("deny", &ApiConfig::new(10.0, 1.0), Arc::new(clock.clone()));
    assert_eq!(bucket.try_acquire(), Decision::Allowed { remaining: 0 });
    assert_eq!(bucket.try_acquire(), Decision::Denied { wait: Duration::from_millis(100) });
}
