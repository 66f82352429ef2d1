//! Rate-limit counting stores and key-derivation strategies.
//!
//! Admission control needs only a windowed counter with a uniform
//! increment/TTL interface; everything else (limits, bursts, headers,
//! fail-open policy) lives in the middleware. Two stores are provided: an
//! in-process store for single-instance deployments and tests, and a Redis
//! store for fleets that must share counters.

pub mod memory;
pub mod redis;

pub use memory::MemoryRateLimitStore;
pub use redis::RedisRateLimitStore;

use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from the counting store backend.
///
/// The middleware treats every store error as fail-open: the request
/// proceeds uncounted.
#[derive(Debug, Error)]
pub enum RateLimitStoreError {
    #[error("Rate limit store error: {0}")]
    Backend(String),
}

/// Windowed counter store with atomic increment semantics.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increment the counter for `key`, creating it with a fresh `window`
    /// TTL if absent. Returns the count after the increment.
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, RateLimitStoreError>;

    /// Remaining time until the counter for `key` expires (zero if absent).
    async fn ttl(&self, key: &str) -> Result<Duration, RateLimitStoreError>;

    /// Current count for `key` (zero if absent).
    async fn count(&self, key: &str) -> Result<i64, RateLimitStoreError>;
}

/// How the rate-limit key is derived from a request.
///
/// Client IP is the universal fallback for the subject-based strategies
/// when no authenticated subject exists yet (admission control runs before
/// authentication).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Per client IP.
    Ip,
    /// Per authenticated user, falling back to IP.
    User,
    /// Per (method, path, subject) composite.
    Route,
    /// Per workspace, falling back to IP.
    Workspace,
}

impl KeyStrategy {
    /// Canonical lowercase name of the strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategy::Ip => "ip",
            KeyStrategy::User => "user",
            KeyStrategy::Route => "route",
            KeyStrategy::Workspace => "workspace",
        }
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown rate limit strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for KeyStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(KeyStrategy::Ip),
            "user" => Ok(KeyStrategy::User),
            "route" => Ok(KeyStrategy::Route),
            "workspace" => Ok(KeyStrategy::Workspace),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}
