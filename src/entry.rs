//! Cache entry with its absolute expiry instant.

use std::time::Duration;
use tokio::time::Instant;

/// A single cache entry containing the value and when it stops being valid.
///
/// Uses Tokio's `Instant` so that paused test clocks drive expiry.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value.
    pub(crate) value: V,

    /// When this entry expires.
    pub(crate) expires_at: Instant,
}

impl<V> Entry<V> {
    /// Create an entry that expires `ttl` from now.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::with_expiration(value, Instant::now() + ttl)
    }

    /// Create an entry with an explicit expiration time.
    pub fn with_expiration(value: V, expires_at: Instant) -> Self {
        Self { value, expires_at }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Check if this entry has expired at a given time.
    ///
    /// An entry is still live at its expiry instant and gone right after.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    /// Get a reference to the value.
    pub fn value(&self) -> &V {
        &self.value
    }
}
