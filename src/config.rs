//! Configuration for the caches.
//!
//! This module provides builder-style configuration for the plain store
//! and for the two loader flavours built on top of it.

use std::time::Duration;

use crate::error::{CacheError, ErrorHandler};

/// TTL applied when neither the call nor the configuration supplies one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Configuration for creating a new store.
///
/// Use the builder pattern to construct configuration:
///
/// ```
/// use expiring_cache::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::new()
///     .max_size(10_000)
///     .default_ttl(Duration::from_secs(300))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the store can hold.
    /// When this limit is reached, the oldest-inserted entry is evicted.
    /// `None` means unbounded.
    pub(crate) max_size: Option<usize>,

    /// TTL for entries when not explicitly specified.
    pub(crate) default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: None,
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    ///
    /// When the store is full, inserting a new key evicts the oldest-inserted
    /// surviving key. Use 0 for unbounded.
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = if size == 0 { None } else { Some(size) };
        self
    }

    /// Set the default TTL for entries.
    ///
    /// `Duration::ZERO` makes every entry without an explicit TTL expire as
    /// soon as time moves past its insertion.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Self {
        self
    }

    /// Get the maximum size, if set.
    pub fn get_max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Get the default TTL.
    pub fn get_default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

/// Configuration for a [`FetchCache`](crate::FetchCache).
#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    pub(crate) cache: CacheConfig,
    pub(crate) on_fetch_error: ErrorHandler,
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration of the underlying store.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Shorthand for setting the underlying store's default TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.cache = self.cache.default_ttl(ttl);
        self
    }

    /// Shorthand for setting the underlying store's maximum size.
    pub fn max_size(mut self, size: usize) -> Self {
        self.cache = self.cache.max_size(size);
        self
    }

    /// Set the handler invoked when a fetch fails.
    pub fn on_fetch_error<F>(self, handler: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        self.error_handler(ErrorHandler::new(handler))
    }

    /// Set an already constructed error handler.
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_fetch_error = handler;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn get_cache(&self) -> &CacheConfig {
        &self.cache
    }
}

/// Configuration for a [`BatchFetchCache`](crate::BatchFetchCache) or
/// [`SingleValueCache`](crate::SingleValueCache).
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub(crate) cache: CacheConfig,

    /// Interval between automatic refreshes. `None` disables the timer.
    pub(crate) refresh_interval: Option<Duration>,

    /// Whether a refresh is triggered during construction.
    pub(crate) fetch_on_start: bool,

    pub(crate) on_fetch_error: ErrorHandler,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            refresh_interval: None,
            fetch_on_start: true,
            on_fetch_error: ErrorHandler::default(),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration of the underlying store.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Shorthand for setting the underlying store's default TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.cache = self.cache.default_ttl(ttl);
        self
    }

    /// Shorthand for setting the underlying store's maximum size.
    pub fn max_size(mut self, size: usize) -> Self {
        self.cache = self.cache.max_size(size);
        self
    }

    /// Set the interval between automatic refreshes.
    ///
    /// `Duration::ZERO` disables the timer.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }

    /// Enable or disable the refresh triggered at construction.
    pub fn fetch_on_start(mut self, enabled: bool) -> Self {
        self.fetch_on_start = enabled;
        self
    }

    /// Set the handler invoked when a bulk fetch fails.
    pub fn on_fetch_error<F>(self, handler: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        self.error_handler(ErrorHandler::new(handler))
    }

    /// Set an already constructed error handler.
    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_fetch_error = handler;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    pub fn get_cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn get_refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    pub fn get_fetch_on_start(&self) -> bool {
        self.fetch_on_start
    }
}
