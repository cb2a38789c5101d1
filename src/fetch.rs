//! A cache that loads missing keys on demand.
//!
//! Concurrent misses for the same key are deduplicated: the first caller
//! launches the fetch, every later caller attaches to the same in-flight
//! operation, and all of them observe the identical outcome.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::FetchConfig;
use crate::error::{CacheError, ErrorHandler, FetchResult};
use crate::stats::StatsSnapshot;

/// A boxed per-key fetch function.
///
/// Resolves to `Ok(Some(value))` when the key exists upstream, `Ok(None)`
/// when it does not, and `Err(_)` when the lookup itself failed.
pub type FetchFn<K, V> = Arc<dyn Fn(K) -> BoxFuture<'static, FetchResult<Option<V>>> + Send + Sync>;

type Operation<V> = Shared<BoxFuture<'static, Option<V>>>;

/// A fetch that is currently in flight for one key.
///
/// Only the callers awaiting the operation keep it alive. Once all of them
/// are gone the operation is dropped, and its [`PendingSlot`] unregisters it.
struct PendingFetch<V> {
    /// Distinguishes this fetch from a later one registered under the same key.
    id: u64,
    operation: WeakShared<BoxFuture<'static, Option<V>>>,
    /// Number of callers attached to `operation`, including the initiator.
    waiters: usize,
}

struct Registry<K, V> {
    next_id: u64,
    fetches: HashMap<K, PendingFetch<V>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            next_id: 0,
            fetches: HashMap::new(),
        }
    }
}

type PendingMap<K, V> = Arc<Mutex<Registry<K, V>>>;

/// Unregisters fetch `id` for `key` when dropped.
///
/// Owned by the operation itself, so the slot is released when the fetch
/// settles and when every caller abandons it before that.
struct PendingSlot<K: Hash + Eq, V> {
    pending: PendingMap<K, V>,
    key: K,
    id: u64,
}

impl<K: Hash + Eq, V> Drop for PendingSlot<K, V> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending
            .fetches
            .get(&self.key)
            .is_some_and(|fetch| fetch.id == self.id)
        {
            pending.fetches.remove(&self.key);
        }
    }
}

/// An expiring cache that fetches missing keys with a caller-supplied
/// function.
///
/// Fetch failures never reach the caller of [`get`](FetchCache::get): they
/// are passed to the configured error handler and reported as a miss.
///
/// # Example
/// ```
/// use expiring_cache::{BoxError, FetchCache, FetchConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let users = FetchCache::new(
///     |id: u32| async move {
///         Ok::<_, BoxError>(if id == 1 { Some("alice".to_string()) } else { None })
///     },
///     FetchConfig::default(),
/// );
///
/// assert_eq!(users.get(1).await.as_deref(), Some("alice"));
/// assert_eq!(users.get(2).await, None);
/// # }
/// ```
pub struct FetchCache<K, V> {
    cache: TtlCache<K, V>,
    fetcher: FetchFn<K, V>,
    pending: PendingMap<K, V>,
    on_fetch_error: ErrorHandler,
}

impl<K, V> Clone for FetchCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            fetcher: Arc::clone(&self.fetcher),
            pending: Arc::clone(&self.pending),
            on_fetch_error: self.on_fetch_error.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for FetchCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("pending_fetches", &self.pending.lock().fetches.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> FetchCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache backed by `fetcher`.
    pub fn new<F, Fut>(fetcher: F, config: FetchConfig) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<Option<V>>> + Send + 'static,
    {
        let fetcher: FetchFn<K, V> = Arc::new(move |key| fetcher(key).boxed());
        Self::with_fetch_fn(fetcher, config)
    }

    /// Create a new cache from an already boxed fetch function.
    pub fn with_fetch_fn(fetcher: FetchFn<K, V>, config: FetchConfig) -> Self {
        Self {
            cache: TtlCache::new(config.cache),
            fetcher,
            pending: Arc::new(Mutex::new(Registry::default())),
            on_fetch_error: config.on_fetch_error,
        }
    }

    /// Get the value for `key`, fetching it on a miss.
    ///
    /// A hit returns without suspending. On a miss, the caller either
    /// attaches to the fetch already in flight for `key` or launches one.
    /// A found value is stored under `key`. A missing key or a failed fetch
    /// resolves to `None` and leaves the store untouched.
    pub async fn get(&self, key: K) -> Option<V> {
        if let Some(value) = self.cache.get(&key) {
            return Some(value);
        }

        let operation = {
            let mut pending = self.pending.lock();
            let attached = pending.fetches.get_mut(&key).and_then(|fetch| {
                let operation = fetch.operation.upgrade()?;
                fetch.waiters += 1;
                Some((operation, fetch.waiters))
            });

            match attached {
                Some((operation, waiters)) => {
                    self.cache.stats_ref().record_coalesced();
                    debug!(waiters, "joined in-flight fetch");
                    operation
                }
                None => {
                    // A fetch may have settled between the first lookup and
                    // taking the lock. Settled fetches store their value
                    // before releasing their slot, so checking again here is
                    // enough.
                    if let Some(value) = self.cache.peek(&key) {
                        return Some(value);
                    }

                    let id = pending.next_id;
                    pending.next_id = pending.next_id.wrapping_add(1);
                    let operation = self.start_fetch(key.clone(), id);
                    if let Some(weak) = operation.downgrade() {
                        pending.fetches.insert(
                            key,
                            PendingFetch {
                                id,
                                operation: weak,
                                waiters: 1,
                            },
                        );
                    }
                    operation
                }
            }
        };

        operation.await
    }

    /// Read the store only. Never fetches.
    pub fn get_sync<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key)
    }

    /// Store a value directly, bypassing the fetch function.
    pub fn set(&self, key: K, value: V) {
        self.cache.set(key, value);
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.cache.set_with_ttl(key, value, ttl);
    }

    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.delete(key)
    }

    /// Clear the store. Fetches already in flight still store their result.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cleanup(&self) -> usize {
        self.cache.cleanup()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.cache.stats()
    }

    /// Number of keys with a fetch in flight.
    pub fn pending_fetches(&self) -> usize {
        self.pending.lock().fetches.len()
    }

    /// Number of callers attached to the in-flight fetch for `key`,
    /// including the one that launched it. Zero when nothing is in flight.
    pub fn waiters<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.pending
            .lock()
            .fetches
            .get(key)
            .map_or(0, |fetch| fetch.waiters)
    }

    /// Build the shared operation for `key`.
    ///
    /// Called with the pending lock held. The fetch function itself only
    /// runs once the operation is first polled, after the lock is released.
    fn start_fetch(&self, key: K, id: u64) -> Operation<V> {
        let stats = self.cache.stats_ref();
        stats.record_fetch();
        debug!("fetching missing cache key");

        let fetcher = Arc::clone(&self.fetcher);
        let cache = self.cache.clone();
        let on_fetch_error = self.on_fetch_error.clone();
        let slot = PendingSlot {
            pending: Arc::clone(&self.pending),
            key: key.clone(),
            id,
        };

        let fetch_key = key.clone();

        async move {
            let fetch = async move { fetcher(fetch_key).await };
            let outcome = match AssertUnwindSafe(fetch).catch_unwind().await {
                Ok(Ok(Some(value))) => {
                    cache.set(key, value.clone());
                    Some(value)
                }
                Ok(Ok(None)) => None,
                Ok(Err(source)) => {
                    stats.record_fetch_error();
                    on_fetch_error.handle(&CacheError::Fetch { source });
                    None
                }
                Err(_panic) => {
                    stats.record_fetch_error();
                    on_fetch_error.handle(&CacheError::Abandoned("fetch"));
                    None
                }
            };

            // Release the slot before resolving, so a caller woken by this
            // outcome never finds the settled fetch still registered.
            drop(slot);
            outcome
        }
        .boxed()
        .shared()
    }
}
