use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::limiter::Clock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Duration,
}

/// String-keyed cache whose entries expire after a TTL. Expired entries are
/// evicted by the read that finds them and swept on every insert, so the map
/// only holds keys still inside their TTL.
pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    #[must_use]
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { clock, default_ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if now > entry.expires_at => {
                entries.remove(key);
                tracing::trace!(key, "cache entry expired");
                None
            }
            Some(entry) => {
                tracing::trace!(key, "cache hit");
                Some(entry.value.clone())
            }
            None => {
                tracing::trace!(key, "cache miss");
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        let swept = before - entries.len();
        if swept > 0 {
            tracing::trace!(swept, "expired cache entries swept");
        }
        entries.insert(key.into(), CacheEntry { value, expires_at: now + ttl });
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
