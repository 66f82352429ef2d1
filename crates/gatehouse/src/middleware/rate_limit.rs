//! Admission control middleware (rate limiting).
//!
//! Runs ahead of authentication: derives a key for the request, increments
//! a windowed counter, and rejects once the count exceeds limit + burst.
//! Rate-limit headers are set on every response, accepted or rejected.
//!
//! Policy: store errors fail open. Denying availability because the
//! counting backend is down is worse than temporarily skipping a limit,
//! so the request proceeds uncounted.

use crate::auth::claims::AuthContext;
use crate::errors::GatewayError;
use crate::ratelimit::{KeyStrategy, RateLimitStore};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Rate-limit response headers, set regardless of outcome.
const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Options for the admission controller.
#[derive(Debug, Clone)]
pub struct RateLimitOptions {
    /// Requests allowed per window.
    pub limit: i64,

    /// Extra requests tolerated above the limit.
    pub burst: i64,

    /// Window length.
    pub window: Duration,

    /// Key derivation strategy.
    pub strategy: KeyStrategy,
}

/// State for the admission controller.
#[derive(Clone)]
pub struct RateLimitState {
    /// Counting store.
    pub store: Arc<dyn RateLimitStore>,

    /// Controller options.
    pub options: RateLimitOptions,
}

/// Admission control middleware.
#[instrument(skip_all, name = "gatehouse.middleware.rate_limit")]
pub async fn enforce_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Response {
    let key = derive_key(state.options.strategy, &req);

    let count = match state.store.increment(&key, state.options.window).await {
        Ok(count) => count,
        Err(e) => {
            // Fail open: proceed uncounted rather than deny on an
            // infrastructure fault
            tracing::warn!(
                target: "gatehouse.middleware.rate_limit",
                error = %e,
                "Rate limit store error, failing open"
            );
            return next.run(req).await;
        }
    };

    let allowed = state.options.limit + state.options.burst;
    let remaining = (allowed - count).max(0);

    // TTL drives both the reset header and the retry hint; a store error
    // here degrades to "window length" rather than failing the request
    let ttl = state
        .store
        .ttl(&key)
        .await
        .unwrap_or(state.options.window);
    let reset_unix = chrono::Utc::now().timestamp() + ttl_as_i64(ttl);

    let mut response = if count > allowed {
        tracing::debug!(
            target: "gatehouse.middleware.rate_limit",
            key = %key,
            count = count,
            allowed = allowed,
            "Rate limit exceeded"
        );
        GatewayError::RateLimitExceeded {
            retry_after_secs: ttl.as_secs().max(1),
        }
        .into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&state.options.limit.to_string()) {
        headers.insert(HEADER_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert(HEADER_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset_unix.to_string()) {
        headers.insert(HEADER_RESET, value);
    }

    response
}

#[allow(clippy::cast_possible_wrap)]
fn ttl_as_i64(ttl: Duration) -> i64 {
    ttl.as_secs() as i64
}

/// Derive the counting key for a request.
///
/// Subject-based strategies fall back to the client IP when no
/// authenticated subject exists yet (admission control runs before
/// authentication).
fn derive_key(strategy: KeyStrategy, req: &Request) -> String {
    let ip = client_ip(req);

    match strategy {
        KeyStrategy::Ip => format!("ip:{ip}"),
        KeyStrategy::User => req
            .extensions()
            .get::<AuthContext>()
            .and_then(|ctx| ctx.internal_user_id)
            .map_or_else(|| format!("ip:{ip}"), |user_id| format!("user:{user_id}")),
        KeyStrategy::Route => {
            let subject = req
                .extensions()
                .get::<AuthContext>()
                .and_then(|ctx| ctx.internal_user_id)
                .map_or_else(|| ip.clone(), |user_id| user_id.to_string());
            format!("route:{}:{}:{subject}", req.method(), req.uri().path())
        }
        KeyStrategy::Workspace => req
            .extensions()
            .get::<AuthContext>()
            .and_then(|ctx| ctx.workspace.as_ref())
            .map_or_else(
                || format!("ip:{ip}"),
                |ws| format!("workspace:{}", ws.workspace_id),
            ),
    }
}

/// Best-effort client IP: the first X-Forwarded-For hop, then the socket
/// address.
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}
