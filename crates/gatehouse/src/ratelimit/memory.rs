//! In-process rate-limit counter store.
//!
//! Fixed-window counters behind a mutex. Suitable for single-instance
//! deployments and tests; fleets that must share counters use the Redis
//! store instead.

use crate::ratelimit::{RateLimitStore, RateLimitStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sweep the whole map for expired entries once it grows past this size.
const SWEEP_THRESHOLD: usize = 4096;

/// One window's counter.
struct CounterEntry {
    count: i64,
    expires_at: Instant,
}

/// In-memory fixed-window counter store.
///
/// Expired entries are replaced on their next increment; a full sweep runs
/// only when the map grows past [`SWEEP_THRESHOLD`], keeping the common
/// path to a single hash operation.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryRateLimitStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the entry map, surfacing poisoning as a backend error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CounterEntry>>, RateLimitStoreError> {
        self.entries
            .lock()
            .map_err(|_| RateLimitStoreError::Backend("Counter map lock poisoned".to_string()))
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64, RateLimitStoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;

        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }

        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    // Window elapsed: restart the count with a fresh TTL
                    entry.count = 0;
                    entry.expires_at = now + window;
                }
                entry.count += 1;
            })
            .or_insert_with(|| CounterEntry {
                count: 1,
                expires_at: now + window,
            });

        Ok(entry.count)
    }

    async fn ttl(&self, key: &str) -> Result<Duration, RateLimitStoreError> {
        let now = Instant::now();
        let entries = self.lock()?;

        Ok(entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO))
    }

    async fn count(&self, key: &str) -> Result<i64, RateLimitStoreError> {
        let now = Instant::now();
        let entries = self.lock()?;

        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map_or(0, |entry| entry.count))
    }
}
