// Generated Query Cache
//
// Maps (normalized question, store id) to the query text produced by the
// translation service so repeated questions return identical queries
// within the TTL window. Entries are immutable: only inserted or evicted.
//
// Eviction tie-break: strict insertion order. Each put takes a monotonic
// sequence number; when the capacity is exceeded, expired entries go first,
// then the oldest 20% by sequence.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache key: normalized question text scoped to one store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    store_id: String,
    normalized_text: String,
}

impl CacheKey {
    pub fn new(text: &str, store_id: &str) -> Self {
        Self {
            store_id: store_id.to_string(),
            normalized_text: normalize(text),
        }
    }
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    query: String,
    created_at: Instant,
    sequence: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total capacity evictions
    pub evictions: u64,
    /// Total expirations
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    next_sequence: u64,
    stats: CacheStats,
}

/// Process-wide generated-query cache with TTL and capacity bound
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    ttl: Duration,
}

impl QueryCache {
    /// Create a new query cache
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Capacity bound (default: 1000)
    /// * `ttl` - Age after which an entry is never served (default: 1 hour)
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_sequence: 0,
                stats: CacheStats::default(),
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the cached query if present and younger than the TTL
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let mut inner = self.lock();
        let now = Instant::now();

        let lookup = inner
            .entries
            .get(key)
            .map(|entry| (now.duration_since(entry.created_at) > self.ttl, entry.query.clone()));

        match lookup {
            Some((true, _)) => {
                inner.entries.remove(key);
                inner.stats.misses += 1;
                inner.stats.expirations += 1;
                tracing::debug!("Query cache expired for store {}", key.store_id);
                None
            }
            Some((false, query)) => {
                inner.stats.hits += 1;
                tracing::debug!("Query cache hit for store {}", key.store_id);
                Some(query)
            }
            None => {
                inner.stats.misses += 1;
                tracing::debug!("Query cache miss for store {}", key.store_id);
                None
            }
        }
    }

    /// Insert or overwrite the query for `key`
    pub fn put(&self, key: CacheKey, query: String) {
        let mut inner = self.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        inner.entries.insert(
            key,
            CacheEntry {
                query,
                created_at: Instant::now(),
                sequence,
            },
        );

        if inner.entries.len() > self.max_entries {
            self.evict(&mut inner);
        }

        tracing::debug!("Cached generated query (cache size: {})", inner.entries.len());
    }

    /// Maintenance pass: drop expired entries, then the oldest 20% if still over capacity
    fn evict(&self, inner: &mut CacheInner) {
        let now = Instant::now();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.created_at) <= self.ttl);
        let expired = before - inner.entries.len();
        inner.stats.expirations += expired as u64;

        let len = inner.entries.len();
        if len <= self.max_entries {
            return;
        }

        let fifth = (len as f64 * 0.2).ceil() as usize;
        let to_remove = fifth.max(len - self.max_entries);

        let mut by_age: Vec<(u64, CacheKey)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (entry.sequence, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(sequence, _)| *sequence);

        for (_, key) in by_age.into_iter().take(to_remove) {
            inner.entries.remove(&key);
        }
        inner.stats.evictions += to_remove as u64;

        tracing::info!(
            "Query cache over capacity: expired {}, evicted {} oldest entries",
            expired,
            to_remove
        );
    }

    /// Remove entries expired as of `now`
    pub fn cleanup_expired(&self, now: Instant) {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.duration_since(entry.created_at) <= self.ttl);
        let expired = before - inner.entries.len();
        inner.stats.expirations += expired as u64;

        if expired > 0 {
            tracing::info!("Cleaned up {} expired query cache entries", expired);
        }
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Get current cache size
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Show   TOP 5\tcustomers "), "show top 5 customers");
    }

    #[test]
    fn test_key_scoped_by_store() {
        let a = CacheKey::new("Show top 5 customers", "sales");
        let b = CacheKey::new("show top 5   customers", "sales");
        let c = CacheKey::new("show top 5 customers", "hr");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_put_and_get() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        let key = CacheKey::new("count orders", "sales");
        cache.put(key.clone(), "SELECT COUNT(*) FROM orders".to_string());

        assert_eq!(cache.get(&key).as_deref(), Some("SELECT COUNT(*) FROM orders"));
        assert_eq!(cache.get(&key).as_deref(), Some("SELECT COUNT(*) FROM orders"));
    }

    #[test]
    fn test_cache_miss() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        assert!(cache.get(&CacheKey::new("nothing", "sales")).is_none());
        assert_eq!(cache.get_stats().misses, 1);
    }

    #[test]
    fn test_cache_expiration() {
        let cache = QueryCache::new(10, Duration::from_millis(100));
        let key = CacheKey::new("count orders", "sales");
        cache.put(key.clone(), "SELECT 1".to_string());

        // Should exist immediately
        assert!(cache.get(&key).is_some());

        // Wait for expiration
        std::thread::sleep(Duration::from_millis(150));

        // Should be expired
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.get_stats().expirations, 1);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        let key = CacheKey::new("count orders", "sales");
        cache.put(key.clone(), "SELECT 1".to_string());
        cache.put(key.clone(), "SELECT 2".to_string());
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&key).as_deref(), Some("SELECT 2"));
    }

    #[test]
    fn test_capacity_evicts_oldest_fifth() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        for i in 0..10 {
            cache.put(CacheKey::new(&format!("q{}", i), "sales"), format!("SELECT {}", i));
        }
        assert_eq!(cache.size(), 10);

        // 11th insert overflows: ceil(11 * 0.2) = 3 oldest go
        cache.put(CacheKey::new("q10", "sales"), "SELECT 10".to_string());
        assert_eq!(cache.size(), 8);
        for i in 0..3 {
            assert!(cache.get(&CacheKey::new(&format!("q{}", i), "sales")).is_none());
        }
        for i in 3..=10 {
            assert!(cache.get(&CacheKey::new(&format!("q{}", i), "sales")).is_some());
        }
        assert_eq!(cache.get_stats().evictions, 3);
    }

    #[test]
    fn test_expired_entries_evicted_before_live_ones() {
        let cache = QueryCache::new(3, Duration::from_millis(50));
        cache.put(CacheKey::new("old1", "s"), "SELECT 1".to_string());
        cache.put(CacheKey::new("old2", "s"), "SELECT 2".to_string());
        std::thread::sleep(Duration::from_millis(80));

        cache.put(CacheKey::new("new1", "s"), "SELECT 3".to_string());
        cache.put(CacheKey::new("new2", "s"), "SELECT 4".to_string());

        // Overflow removed only the two expired entries
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get_stats().evictions, 0);
        assert_eq!(cache.get_stats().expirations, 2);
    }

    #[test]
    fn test_bulk_insert_leaves_at_most_capacity() {
        let capacity = 50;
        let cache = QueryCache::new(capacity, Duration::from_secs(60));
        for i in 0..500 {
            cache.put(CacheKey::new(&format!("q{}", i), "s"), format!("SELECT {}", i));
            assert!(cache.size() <= capacity);
        }
        // Most recent insert always survives
        assert!(cache.get(&CacheKey::new("q499", "s")).is_some());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = QueryCache::new(10, Duration::from_secs(60));
        cache.put(CacheKey::new("a", "s"), "SELECT 1".to_string());
        cache.put(CacheKey::new("b", "s"), "SELECT 2".to_string());

        cache.cleanup_expired(Instant::now());
        assert_eq!(cache.size(), 2);

        cache.cleanup_expired(Instant::now() + Duration::from_secs(61));
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get_stats().expirations, 2);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(QueryCache::new(100, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = CacheKey::new(&format!("q{}-{}", t, i), "s");
                        cache.put(key.clone(), format!("SELECT {}", i));
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.size() <= 100);
    }
}
