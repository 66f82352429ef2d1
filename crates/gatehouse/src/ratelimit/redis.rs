//! Redis-backed rate-limit counter store.
//!
//! Shares windowed counters across gateway instances. Uses `INCR` for the
//! atomic count and attaches the window TTL with `EXPIRE` on the first
//! increment of each window, so the counter expires naturally.
//!
//! # Key Pattern
//!
//! - `gatehouse:ratelimit:{key}` - windowed counter
//!
//! # Connection Pattern
//!
//! `ConnectionManager` is designed to be cloned cheaply and used
//! concurrently, reconnecting on failure. No locking is needed - the
//! connection is cloned for each operation.

use crate::ratelimit::{RateLimitStore, RateLimitStoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, error};

/// Redis-backed counter store.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    /// Multiplexed managed connection (cheaply cloneable).
    connection: ConnectionManager,
}

impl RedisRateLimitStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitStoreError::Backend` if the client cannot be
    /// created or the connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, RateLimitStoreError> {
        // Do NOT log redis_url: it may contain credentials
        let client = redis::Client::open(redis_url).map_err(|e| {
            error!(target: "gatehouse.ratelimit.redis", error = %e, "Failed to open Redis client");
            RateLimitStoreError::Backend(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client.get_connection_manager().await.map_err(|e| {
            error!(target: "gatehouse.ratelimit.redis", error = %e, "Failed to connect to Redis");
            RateLimitStoreError::Backend(format!("Failed to connect to Redis: {e}"))
        })?;

        debug!(target: "gatehouse.ratelimit.redis", "Connected to Redis");

        Ok(Self { connection })
    }

    fn redis_key(key: &str) -> String {
        format!("gatehouse:ratelimit:{key}")
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, RateLimitStoreError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::redis_key(key);

        let count: i64 = conn.incr(&redis_key, 1).await.map_err(|e| {
            RateLimitStoreError::Backend(format!("INCR failed: {e}"))
        })?;

        // First increment of the window: attach the TTL so the counter
        // expires naturally
        if count == 1 {
            // Safe cast: windows are small configured durations
            #[allow(clippy::cast_possible_wrap)]
            let window_secs = window.as_secs().max(1) as i64;
            let _: bool = conn.expire(&redis_key, window_secs).await.map_err(|e| {
                RateLimitStoreError::Backend(format!("EXPIRE failed: {e}"))
            })?;
        }

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Duration, RateLimitStoreError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::redis_key(key);

        // TTL returns -2 for a missing key and -1 for a key without expiry
        let ttl_secs: i64 = conn.ttl(&redis_key).await.map_err(|e| {
            RateLimitStoreError::Backend(format!("TTL failed: {e}"))
        })?;

        #[allow(clippy::cast_sign_loss)]
        Ok(if ttl_secs > 0 {
            Duration::from_secs(ttl_secs as u64)
        } else {
            Duration::ZERO
        })
    }

    async fn count(&self, key: &str) -> Result<i64, RateLimitStoreError> {
        let mut conn = self.connection.clone();
        let redis_key = Self::redis_key(key);

        let count: Option<i64> = conn.get(&redis_key).await.map_err(|e| {
            RateLimitStoreError::Backend(format!("GET failed: {e}"))
        })?;

        Ok(count.unwrap_or(0))
    }
}
