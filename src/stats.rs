//! Statistics for the caches and their loaders.
//!
//! Atomic counters shared between a store and the loader wrapping it, so a
//! snapshot taken from either reflects both.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache and loader operations.
///
/// All counters are atomic and can be safely updated from multiple threads.
/// Use `stats()` on any cache type to get a [`StatsSnapshot`].
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads that found a live entry.
    hits: AtomicU64,

    /// Reads that found nothing or an expired entry.
    misses: AtomicU64,

    /// Entries removed to stay within `max_size`.
    evictions: AtomicU64,

    /// Entries removed because their TTL had passed.
    expirations: AtomicU64,

    /// Current number of physically stored entries.
    size: AtomicU64,

    sets: AtomicU64,
    deletes: AtomicU64,

    /// Per-key fetches actually launched.
    fetches: AtomicU64,

    /// Per-key fetches that raised an error.
    fetch_errors: AtomicU64,

    /// Callers that attached to an operation already in flight.
    coalesced: AtomicU64,

    /// Bulk refresh cycles started.
    refreshes: AtomicU64,

    /// Bulk refresh cycles that raised an error.
    refresh_errors: AtomicU64,
}

impl CacheStats {
    /// Create a new stats instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_error(&self) {
        self.refresh_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the size to a specific value.
    pub fn set_size(&self, size: usize) {
        self.size.store(size as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn refresh_errors(&self) -> u64 {
        self.refresh_errors.load(Ordering::Relaxed)
    }

    /// Calculate the hit rate as a percentage (0.0 to 100.0).
    /// Returns 0.0 if no reads have been performed.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Create a snapshot of the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            expirations: self.expirations(),
            size: self.size(),
            sets: self.sets(),
            deletes: self.deletes(),
            hit_rate: self.hit_rate(),
            fetches: self.fetches(),
            fetch_errors: self.fetch_errors(),
            coalesced: self.coalesced(),
            refreshes: self.refreshes(),
            refresh_errors: self.refresh_errors(),
        }
    }
}

/// A point-in-time snapshot of cache statistics.
///
/// Unlike `CacheStats`, this struct contains plain values (not atomics)
/// and can be easily logged or compared.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: u64,
    pub sets: u64,
    pub deletes: u64,
    pub hit_rate: f64,
    pub fetches: u64,
    pub fetch_errors: u64,
    pub coalesced: u64,
    pub refreshes: u64,
    pub refresh_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_stats() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 0);
        assert_eq!(stats.size(), 0);
        assert_eq!(stats.fetches(), 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();

        // No reads = 0% hit rate
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        assert!((stats.hit_rate() - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_snapshot() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_set();
        stats.set_size(1);
        stats.record_fetch();
        stats.record_coalesced();
        stats.record_coalesced();
        stats.record_refresh_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.sets, 1);
        assert_eq!(snapshot.size, 1);
        assert_eq!(snapshot.fetches, 1);
        assert_eq!(snapshot.coalesced, 2);
        assert_eq!(snapshot.refresh_errors, 1);
    }
}
