//! Admission control integration tests.
//!
//! Exercises the rate-limit layer on the assembled router: headers on every
//! response, rejection past limit + burst with a retry hint, window reset,
//! and the fail-open policy on store errors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use common::{get, TestGateway};
use gatehouse::services::mock::MockDirectory;

fn header_i64(response: &common::TestResponse, name: &str) -> i64 {
    response
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .expect("response should carry the numeric rate-limit header")
}

#[tokio::test]
async fn test_headers_present_on_accepted_requests() {
    let gateway = TestGateway::spawn(
        &[("RATE_LIMIT_RPM", "100"), ("RATE_LIMIT_BURST", "10")],
        MockDirectory::new(),
    )
    .await;

    let response = get(&gateway.router, "/v1/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(header_i64(&response, "x-ratelimit-limit"), 100);
    // First request of the window: 110 allowed, 1 consumed
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 109);

    let reset = header_i64(&response, "x-ratelimit-reset");
    let now = chrono::Utc::now().timestamp();
    assert!(reset > now, "reset should be in the future");
    assert!(reset <= now + 61, "reset should be within the window");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_remaining_counts_down() {
    let gateway = TestGateway::spawn(
        &[("RATE_LIMIT_RPM", "5"), ("RATE_LIMIT_BURST", "0")],
        MockDirectory::new(),
    )
    .await;

    for expected_remaining in [4, 3, 2] {
        let response = get(&gateway.router, "/v1/health", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            header_i64(&response, "x-ratelimit-remaining"),
            expected_remaining
        );
    }

    gateway.key_store.close();
}

#[tokio::test]
async fn test_111th_request_in_window_is_rejected() {
    let gateway = TestGateway::spawn(
        &[
            ("RATE_LIMIT_RPM", "100"),
            ("RATE_LIMIT_BURST", "10"),
            ("RATE_LIMIT_WINDOW_SECONDS", "60"),
        ],
        MockDirectory::new(),
    )
    .await;

    // limit + burst = 110 requests pass
    for i in 0..110 {
        let response = get(&gateway.router, "/v1/health", None).await;
        assert_eq!(response.status, StatusCode::OK, "request {} should pass", i + 1);
    }

    // The 111th is rejected with the retry hint
    let response = get(&gateway.router, "/v1/health", None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.error_code(), "RATE_LIMIT_EXCEEDED");
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 0);

    let retry_after = header_i64(&response, "retry-after");
    assert!(retry_after >= 1, "Retry-After should be at least 1 second");
    assert!(retry_after <= 60, "Retry-After should not exceed the window");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_window_reset_restarts_counting() {
    let gateway = TestGateway::spawn(
        &[
            ("RATE_LIMIT_RPM", "2"),
            ("RATE_LIMIT_BURST", "0"),
            ("RATE_LIMIT_WINDOW_SECONDS", "1"),
        ],
        MockDirectory::new(),
    )
    .await;

    // Exhaust the window
    for _ in 0..2 {
        let response = get(&gateway.router, "/v1/health", None).await;
        assert_eq!(response.status, StatusCode::OK);
    }
    let response = get(&gateway.router, "/v1/health", None).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // After the TTL elapses, counting restarts from zero
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let response = get(&gateway.router, "/v1/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 1);

    gateway.key_store.close();
}

#[tokio::test]
async fn test_rate_limit_can_be_disabled() {
    let gateway = TestGateway::spawn(
        &[
            ("RATE_LIMIT_ENABLED", "false"),
            ("RATE_LIMIT_RPM", "1"),
            ("RATE_LIMIT_BURST", "0"),
        ],
        MockDirectory::new(),
    )
    .await;

    for _ in 0..5 {
        let response = get(&gateway.router, "/v1/health", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(
            !response.headers.contains_key("x-ratelimit-limit"),
            "disabled admission control must not set headers"
        );
    }

    gateway.key_store.close();
}

#[tokio::test]
async fn test_store_failure_fails_open() {
    use gatehouse::middleware::{enforce_rate_limit, RateLimitOptions, RateLimitState};
    use gatehouse::ratelimit::{KeyStrategy, RateLimitStore, RateLimitStoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// A store whose backend is down.
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RateLimitStore for FailingStore {
        async fn increment(
            &self,
            _key: &str,
            _window: Duration,
        ) -> Result<i64, RateLimitStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RateLimitStoreError::Backend("store is down".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<Duration, RateLimitStoreError> {
            Err(RateLimitStoreError::Backend("store is down".to_string()))
        }

        async fn count(&self, _key: &str) -> Result<i64, RateLimitStoreError> {
            Err(RateLimitStoreError::Backend("store is down".to_string()))
        }
    }

    let store = Arc::new(FailingStore {
        calls: AtomicUsize::new(0),
    });

    let state = Arc::new(RateLimitState {
        store: store.clone(),
        options: RateLimitOptions {
            limit: 1,
            burst: 0,
            window: Duration::from_secs(60),
            strategy: KeyStrategy::Ip,
        },
    });

    let router = axum::Router::new()
        .route("/v1/ping", axum::routing::get(|| async { "pong" }))
        .layer(axum::middleware::from_fn_with_state(state, enforce_rate_limit));

    // Far more requests than the limit all pass: the store error fails open
    for _ in 0..10 {
        let response = get(&router, "/v1/ping", None).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    assert_eq!(store.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_forwarded_for_splits_clients() {
    let gateway = TestGateway::spawn(
        &[("RATE_LIMIT_RPM", "2"), ("RATE_LIMIT_BURST", "0")],
        MockDirectory::new(),
    )
    .await;

    // Exhaust one client's window
    for _ in 0..2 {
        let response = common::get_with_headers(
            &gateway.router,
            "/v1/health",
            None,
            &[("x-forwarded-for", "203.0.113.9")],
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
    }
    let response = common::get_with_headers(
        &gateway.router,
        "/v1/health",
        None,
        &[("x-forwarded-for", "203.0.113.9")],
    )
    .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // A different client is unaffected
    let response = common::get_with_headers(
        &gateway.router,
        "/v1/health",
        None,
        &[("x-forwarded-for", "198.51.100.7")],
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    gateway.key_store.close();
}
