//! The plain expiring cache.
//!
//! This module provides `TtlCache`, the store every loader in this crate is
//! built on. It wraps the internal storage and provides a clean,
//! thread-safe API.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::storage::Store;

/// A thread-safe, in-memory cache with per-entry TTL and FIFO eviction.
///
/// # Features
/// - **Thread-safe**: Cloning creates a new handle onto the same entries.
/// - **TTL support**: Every entry expires, after the configured default TTL
///   or a per-call override.
/// - **Lazy expiry**: Expired entries are removed when read, or in bulk by
///   [`cleanup`](TtlCache::cleanup).
/// - **FIFO eviction**: When `max_size` is reached, inserting a new key
///   evicts the oldest-inserted key.
///
/// # Example
/// ```
/// use expiring_cache::{CacheConfig, TtlCache};
/// use std::time::Duration;
///
/// let cache = TtlCache::new(
///     CacheConfig::new()
///         .max_size(1000)
///         .default_ttl(Duration::from_secs(300))
///         .build(),
/// );
///
/// cache.set("user:123", "Alice");
/// assert_eq!(cache.get("user:123"), Some("Alice"));
///
/// cache.set_with_ttl("session:abc", "data", Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct TtlCache<K, V> {
    db: Arc<Store<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            db: Arc::new(Store::new(config)),
        }
    }

    /// Get a value from the cache.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Reading an
    /// expired entry removes it.
    ///
    /// # Example
    /// ```
    /// use expiring_cache::TtlCache;
    ///
    /// let cache = TtlCache::default();
    /// cache.set("key".to_string(), 1);
    ///
    /// match cache.get("key") {
    ///     Some(value) => println!("Found: {}", value),
    ///     None => println!("Not found"),
    /// }
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.get(key)
    }

    /// Insert or overwrite a value using the configured default TTL.
    ///
    /// Overwriting keeps the key's original position in the eviction order.
    pub fn set(&self, key: K, value: V) {
        self.db.set(key, value);
    }

    /// Insert or overwrite a value with a specific TTL.
    ///
    /// A zero TTL stores an entry that expires on the next read after the
    /// current instant.
    ///
    /// # Example
    /// ```
    /// use expiring_cache::TtlCache;
    /// use std::time::Duration;
    ///
    /// let cache = TtlCache::default();
    /// cache.set_with_ttl("session", "data", Duration::from_secs(3600));
    /// assert!(cache.contains("session"));
    /// ```
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.db.set_with_ttl(key, value, ttl);
    }

    /// Delete a key from the cache.
    ///
    /// Returns `true` if the key existed and was removed.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.delete(key)
    }

    /// Check if a live entry exists for `key`.
    ///
    /// Unlike [`get`](TtlCache::get) this does not count towards hits or
    /// misses.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.contains(key)
    }

    /// Get the number of entries in the cache.
    ///
    /// Note: This may include expired entries that haven't been read or
    /// cleaned up yet.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        self.db.clear();
    }

    /// Remove every expired entry, whether or not it has been read.
    ///
    /// Returns the number of entries that were removed. Lazy expiry only
    /// purges keys that are read again, so write-heavy key spaces should call
    /// this periodically.
    ///
    /// # Example
    /// ```
    /// use expiring_cache::TtlCache;
    /// use std::time::Duration;
    ///
    /// let cache = TtlCache::default();
    /// cache.set_with_ttl("key", "value", Duration::from_millis(1));
    /// std::thread::sleep(Duration::from_millis(10));
    /// assert_eq!(cache.cleanup(), 1);
    /// ```
    pub fn cleanup(&self) -> usize {
        self.db.cleanup_expired()
    }

    /// Get a snapshot of the cache statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.db.stats().snapshot()
    }

    /// Get a reference to the internal statistics counter.
    ///
    /// Loaders record their fetch counters here.
    pub fn stats_ref(&self) -> Arc<CacheStats> {
        self.db.stats()
    }

    pub fn config(&self) -> &CacheConfig {
        self.db.config()
    }

    /// Atomically replace the whole contents, using the default TTL.
    pub(crate) fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.db.peek(key)
    }

    pub(crate) fn replace_all<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.db.replace_all(items)
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache = TtlCache::default();

        cache.set("key".to_string(), "value");
        assert_eq!(cache.get("key"), Some("value"));
        assert!(cache.contains("key"));

        cache.delete("key");
        assert!(!cache.contains("key"));
    }

    #[test]
    fn test_cache_is_clone() {
        let cache1 = TtlCache::default();
        cache1.set("key", 1);

        let cache2 = cache1.clone();

        // Both point to the same underlying data
        assert_eq!(cache2.get("key"), Some(1));

        cache2.set("key2", 2);
        assert_eq!(cache1.get("key2"), Some(2));
    }

    #[test]
    fn test_cache_stats() {
        let cache = TtlCache::default();

        cache.set("key", 1);
        let _ = cache.get("key");
        let _ = cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_cache_thread_safety() {
        use std::thread;

        let cache: TtlCache<String, String> = TtlCache::default();
        let mut handles = vec![];

        for i in 0..10 {
            let cache = cache.clone();
            let handle = thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key_{}", j);
                    cache.set(key.clone(), format!("value_{}_{}", i, j));
                    let _ = cache.get(&key);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 100);
    }
}
