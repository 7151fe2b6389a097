//! Counter Store
//!
//! Atomic increment-with-expiry counters backing the rate limiter. The
//! production store is external (anything with INCR + EXPIRE semantics);
//! [`InMemoryCounterStore`] is the process-local implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::core::clock::SharedClock;

/// Counter store failure.
#[derive(Debug, Clone, Error)]
pub enum CounterError {
    /// Backend unreachable.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Shared counters with per-key expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a fresh window of `ttl` when the key is
    /// absent or expired. Returns the new value.
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CounterError>;

    /// Current value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, CounterError>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<(), CounterError>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    expires_at: DateTime<Utc>,
}

/// Process-local counter store driven by the injected clock.
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
    clock: SharedClock,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop expired keys.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut counters = self.counters.lock();
        let before = counters.len();
        counters.retain(|_, c| c.expires_at > now);
        before - counters.len()
    }

    /// Keys held in memory, expired ones included.
    pub fn tracked_keys(&self) -> usize {
        self.counters.lock().len()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.counters.lock().values().filter(|c| c.expires_at > now).count()
    }

    /// Whether no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, CounterError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CounterError::Unavailable(format!("invalid ttl: {}", e)))?;

        let mut counters = self.counters.lock();
        let counter = counters
            .entry(key.to_string())
            .and_modify(|c| {
                if c.expires_at <= now {
                    *c = Counter { value: 0, expires_at: now + ttl };
                }
            })
            .or_insert(Counter { value: 0, expires_at: now + ttl });
        counter.value += 1;
        Ok(counter.value)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, CounterError> {
        let now = self.clock.now();
        Ok(self
            .counters
            .lock()
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.value))
    }

    async fn delete(&self, key: &str) -> Result<(), CounterError> {
        self.counters.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_increment_and_expire() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryCounterStore::new(clock.clone());
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 1);
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 2);

        // Expiry is anchored to the first increment of the window.
        clock.advance(Duration::from_secs(59));
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 3);
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryCounterStore::new(clock.clone());

        store.increment_with_expiry("a", Duration::from_secs(10)).await.unwrap();
        store.increment_with_expiry("b", Duration::from_secs(100)).await.unwrap();
        store.delete("b").await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), None);

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }
}
