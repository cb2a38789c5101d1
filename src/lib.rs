//! # Expiring Cache
//!
//! In-memory expiring caches for Rust, from a bare TTL store up to loaders
//! that fetch from a slower source of truth.
//!
//! ## Cache types
//!
//! - [`TtlCache`]: key/value store where every entry expires. Expired
//!   entries are purged lazily on read or in bulk by `cleanup()`. An
//!   optional `max_size` evicts the oldest-inserted key first.
//! - [`FetchCache`]: fetches missing keys on demand. Concurrent misses for
//!   the same key share one fetch.
//! - [`BatchFetchCache`]: replaces its whole contents from a bulk fetch on
//!   start, on a timer, or on demand. Failed refreshes keep the old data.
//! - [`SingleValueCache`]: a `BatchFetchCache` holding one value.
//!
//! Fetch failures never surface as errors from `get`. They are passed to the
//! configured [`ErrorHandler`] (which logs through `tracing` by default) and
//! reported as a miss.
//!
//! ## Quick Start
//!
//! ```rust
//! use expiring_cache::{CacheConfig, TtlCache};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .max_size(10_000)
//!     .default_ttl(Duration::from_secs(300))
//!     .build();
//!
//! let cache = TtlCache::new(config);
//!
//! cache.set("user:123", "Alice");
//!
//! if let Some(value) = cache.get("user:123") {
//!     println!("Found: {}", value);
//! }
//!
//! // Set with custom TTL
//! cache.set_with_ttl("session:abc", "session_data", Duration::from_secs(60));
//!
//! let stats = cache.stats();
//! println!("Hit rate: {:.1}%", stats.hit_rate);
//! ```
//!
//! ## Loading on demand
//!
//! ```rust
//! use expiring_cache::{BoxError, FetchCache, FetchConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = FetchCache::new(
//!     |key: String| async move { Ok::<_, BoxError>(Some(key.len())) },
//!     FetchConfig::new()
//!         .default_ttl(Duration::from_secs(30))
//!         .on_fetch_error(|err| eprintln!("lookup failed: {}", err))
//!         .build(),
//! );
//!
//! let (a, b) = futures::join!(cache.get("hello".into()), cache.get("hello".into()));
//! assert_eq!((a, b), (Some(5), Some(5)));
//! assert_eq!(cache.stats().fetches, 1);
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod single;
pub mod stats;

pub use batch::{BatchFetchCache, BatchFetchFn};
pub use cache::TtlCache;
pub use config::{BatchConfig, CacheConfig, FetchConfig, DEFAULT_TTL};
pub use error::{BoxError, CacheError, ErrorHandler, FetchResult};
pub use fetch::{FetchCache, FetchFn};
pub use single::SingleValueCache;
pub use stats::{CacheStats, StatsSnapshot};

// Internal modules - not part of public API
pub(crate) mod entry;
pub(crate) mod storage;
