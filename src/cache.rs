//! TTL cache for repository memory reads.
//!
//! Context retrieval reads the memory record on every request; the cache
//! bounds store round-trips without letting retrieval observe stale records
//! for longer than the TTL. The cache is injected into the context builder
//! so tests can construct it with a zero TTL or probe expiry with explicit
//! timestamps.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A thread-safe map with per-entry expiry.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live entry. Expired entries read as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Drop the entry for a key, forcing the next read to miss. Used after
    /// writes that supersede the cached record.
    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((inserted_at, value)) if now.duration_since(*inserted_at) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (now, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));
    }

    #[test]
    fn miss_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at("k".to_string(), 1, start);
        assert_eq!(
            cache.get_at(&"k".to_string(), start + Duration::from_secs(59)),
            Some(1)
        );
        assert_eq!(
            cache.get_at(&"k".to_string(), start + Duration::from_secs(61)),
            None
        );
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1);
        cache.invalidate(&"k".to_string());
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), None);
    }
}
