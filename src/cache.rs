//! Generic in-memory cache with per-entry TTL and lazy eviction.
//!
//! A single coarse lock guards the whole map. Entry count is bounded by the
//! number of distinct cache keys in the system (effectively one), so
//! per-key locking would buy nothing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Key-value cache where every entry carries its own time-to-live.
///
/// An entry is logically absent once its TTL has elapsed; expiry is checked
/// at read time and the stale entry is removed in the same operation, never
/// returned.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Optional hygiene pass; correctness never depends on it.
    pub fn cleanup_expired(&self) {
        self.entries.lock().retain(|_, entry| !entry.is_expired());
    }
}

impl<V: Clone> TtlCache<V> {
    /// Look up a value. Expired entries are evicted and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => None,
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
        }
    }
}
