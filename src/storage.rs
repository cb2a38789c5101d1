//! Internal storage implementation for the caches.
//!
//! This module provides the low-level storage using an `IndexMap` for
//! maintaining insertion order, which drives FIFO eviction.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::entry::Entry;
use crate::stats::CacheStats;

/// Thread-safe key to entry mapping with lazy expiry and FIFO eviction.
///
/// This is the internal implementation; users should use `TtlCache` instead.
#[derive(Debug)]
pub struct Store<K, V> {
    /// The actual storage, protected by a read-write lock.
    /// Overwriting an existing key keeps its position, so index 0 is always
    /// the oldest-inserted surviving key.
    entries: RwLock<IndexMap<K, Entry<V>>>,

    config: CacheConfig,

    stats: Arc<CacheStats>,
}

impl<K, V> Store<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a new store with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
            config,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Create a new store with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Get a value from the store.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry found this way is removed.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        {
            let entries = self.read_lock()?;

            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.stats.record_hit();
                    return Some(entry.value().clone());
                }
                Some(_) => {
                    // Entry expired - need write lock to remove it
                    drop(entries);
                    self.remove_expired(key);
                }
                None => {}
            }
        }

        self.stats.record_miss();
        None
    }

    /// Read a live value without recording a hit or a miss.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.read_lock()?;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value().clone())
    }

    /// Set a value using the configured default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Set a value with a specific TTL.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let entry = Entry::new(value, ttl);

        let mut entries = match self.write_lock() {
            Some(e) => e,
            None => return, // Lock poisoned, silently fail
        };

        self.insert(&mut entries, key, entry);
        self.stats.set_size(entries.len());
    }

    /// Replace the whole contents with `items`, all using the default TTL.
    ///
    /// Clearing and repopulating happen under one write lock, so no reader
    /// observes the intermediate empty map. Returns the number of entries
    /// stored afterwards.
    pub fn replace_all<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut entries = match self.write_lock() {
            Some(e) => e,
            None => return 0,
        };

        entries.clear();
        let expires_at = Instant::now() + self.config.default_ttl;
        for (key, value) in items {
            self.insert(&mut entries, key, Entry::with_expiration(value, expires_at));
        }

        let len = entries.len();
        self.stats.set_size(len);
        len
    }

    /// Delete a key from the store.
    ///
    /// Returns `true` if the key existed and was removed.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = match self.write_lock() {
            Some(e) => e,
            None => return false,
        };

        let existed = entries.shift_remove(key).is_some();
        if existed {
            self.stats.record_delete();
            self.stats.set_size(entries.len());
        }
        existed
    }

    /// Check if a key exists in the store (and is not expired).
    ///
    /// Does not count towards hits or misses.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = match self.read_lock() {
            Some(e) => e,
            None => return false,
        };

        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entries);
                self.remove_expired(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Get the number of physically stored entries.
    ///
    /// Note: This may include expired entries that haven't been removed yet.
    pub fn len(&self) -> usize {
        match self.read_lock() {
            Some(entries) => entries.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries.
    pub fn clear(&self) {
        if let Some(mut entries) = self.write_lock() {
            entries.clear();
            self.stats.set_size(0);
        }
    }

    /// Get a reference to the statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Remove all expired entries, read or not.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = match self.write_lock() {
            Some(e) => e,
            None => return 0,
        };

        let initial_len = entries.len();
        let now = Instant::now();

        entries.retain(|_, entry| {
            let expired = entry.is_expired_at(now);
            if expired {
                self.stats.record_expiration();
            }
            !expired
        });

        self.stats.set_size(entries.len());
        initial_len - entries.len()
    }

    // Private helper methods

    /// Acquire a read lock, returning None if poisoned.
    fn read_lock(&self) -> Option<RwLockReadGuard<'_, IndexMap<K, Entry<V>>>> {
        self.entries.read().ok()
    }

    /// Acquire a write lock, returning None if poisoned.
    fn write_lock(&self) -> Option<RwLockWriteGuard<'_, IndexMap<K, Entry<V>>>> {
        self.entries.write().ok()
    }

    /// Insert under an already held write lock, evicting first if a new key
    /// would exceed `max_size`.
    fn insert(&self, entries: &mut IndexMap<K, Entry<V>>, key: K, entry: Entry<V>) {
        if let Some(max_size) = self.config.max_size {
            // If key already exists, we're replacing, not adding
            if !entries.contains_key(&key) {
                while entries.len() >= max_size {
                    self.evict_one(entries);
                }
            }
        }

        entries.insert(key, entry);
        self.stats.record_set();
    }

    /// Remove a specific key if it is (still) expired.
    fn remove_expired<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(mut entries) = self.write_lock() {
            if entries.get(key).is_some_and(|entry| entry.is_expired()) {
                entries.shift_remove(key);
                self.stats.record_expiration();
                self.stats.set_size(entries.len());
            }
        }
    }

    /// Evict the oldest-inserted entry.
    fn evict_one(&self, entries: &mut IndexMap<K, Entry<V>>) {
        if entries.shift_remove_index(0).is_some() {
            self.stats.record_eviction();
            tracing::debug!(remaining = entries.len(), "evicted oldest cache entry");
        }
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}
