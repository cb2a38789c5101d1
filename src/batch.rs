//! A cache whose whole contents are replaced by periodic bulk fetches.
//!
//! At most one refresh cycle is in flight at a time. Concurrent triggers
//! (manual calls, the timer, construction) attach to the running cycle, and
//! reads issued while it runs are ordered after it.

use std::borrow::Borrow;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::BatchConfig;
use crate::error::{CacheError, ErrorHandler, FetchResult};
use crate::stats::StatsSnapshot;

/// A boxed bulk fetch function returning every entry the cache should hold.
pub type BatchFetchFn<K, V> =
    Arc<dyn Fn() -> BoxFuture<'static, FetchResult<Vec<(K, V)>>> + Send + Sync>;

/// A refresh in flight, awaitable by any number of callers.
type RefreshCycle = Shared<BoxFuture<'static, ()>>;

#[derive(Default)]
struct RefreshState {
    cycle: Option<RefreshCycle>,
    /// Set by `shutdown`. Timer ticks observed after this never start a cycle.
    stopped: bool,
}

/// Clears the in-flight cycle when the cycle settles or is dropped.
struct CycleSlot(Arc<Mutex<RefreshState>>);

impl Drop for CycleSlot {
    fn drop(&mut self) {
        self.0.lock().cycle = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Start,
    Manual,
    Timer,
}

impl Trigger {
    /// Cycles the cache starts on its own, as opposed to `fetch_all`.
    fn is_automatic(self) -> bool {
        matches!(self, Trigger::Start | Trigger::Timer)
    }
}

struct Inner<K, V> {
    cache: TtlCache<K, V>,
    fetcher: BatchFetchFn<K, V>,
    refresh: Arc<Mutex<RefreshState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    on_fetch_error: ErrorHandler,
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// An expiring cache refreshed wholesale from a bulk fetch function.
///
/// A successful refresh atomically replaces every entry with the fetched
/// ones (using the default TTL). A failed refresh is passed to the error
/// handler and keeps the previous contents available.
///
/// Construction must happen inside a Tokio runtime for the initial refresh
/// to start eagerly and for the refresh timer to be armed. Without one, the
/// initial refresh runs when first awaited and no timer is started.
///
/// # Example
/// ```
/// use expiring_cache::{BatchConfig, BatchFetchCache, BoxError};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let flags = BatchFetchCache::new(
///     || async { Ok::<_, BoxError>(vec![("dark_mode", true), ("beta", false)]) },
///     BatchConfig::new()
///         .refresh_interval(Duration::from_secs(30))
///         .build(),
/// );
///
/// assert_eq!(flags.get("dark_mode").await, Some(true));
/// flags.shutdown();
/// # }
/// ```
pub struct BatchFetchCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for BatchFetchCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for BatchFetchCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.refresh.lock();
        f.debug_struct("BatchFetchCache")
            .field("refreshing", &state.cycle.is_some())
            .field("stopped", &state.stopped)
            .finish_non_exhaustive()
    }
}

impl<K, V> BatchFetchCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache backed by `fetcher`.
    pub fn new<F, Fut>(fetcher: F, config: BatchConfig) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<Vec<(K, V)>>> + Send + 'static,
    {
        let fetcher: BatchFetchFn<K, V> = Arc::new(move || fetcher().boxed());
        Self::with_fetch_fn(fetcher, config)
    }

    /// Create a new cache from an already boxed bulk fetch function.
    pub fn with_fetch_fn(fetcher: BatchFetchFn<K, V>, config: BatchConfig) -> Self {
        let inner = Arc::new(Inner {
            cache: TtlCache::new(config.cache),
            fetcher,
            refresh: Arc::new(Mutex::new(RefreshState::default())),
            timer: Mutex::new(None),
            on_fetch_error: config.on_fetch_error,
        });
        let runtime = Handle::try_current().ok();

        if config.fetch_on_start {
            let _ = begin_refresh(&inner, Trigger::Start);
        }

        if let Some(interval) = config.refresh_interval {
            match &runtime {
                Some(runtime) => {
                    let timer = spawn_refresh_timer(runtime, Arc::downgrade(&inner), interval);
                    *inner.timer.lock() = Some(timer);
                    info!(?interval, "armed cache refresh timer");
                }
                None => warn!(
                    ?interval,
                    "no Tokio runtime available, cache refresh timer not armed"
                ),
            }
        }

        Self { inner }
    }

    /// Refresh the whole cache.
    ///
    /// If a refresh is already in flight this waits for that one instead of
    /// starting another. Never fails: errors go to the error handler and
    /// leave the current contents in place.
    pub async fn fetch_all(&self) {
        if let Some(cycle) = begin_refresh(&self.inner, Trigger::Manual) {
            cycle.await;
        }
    }

    /// Get a value, waiting for an in-flight refresh to settle first.
    pub async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let cycle = self.inner.refresh.lock().cycle.clone();
        if let Some(cycle) = cycle {
            cycle.await;
        }
        self.inner.cache.get(key)
    }

    /// Read the store only. Never waits for a refresh.
    pub fn get_sync<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.cache.get(key)
    }

    /// Store a value that lives until the next successful refresh replaces
    /// the contents, or until it expires or is evicted.
    pub fn set_until_next_refresh(&self, key: K, value: V) {
        self.inner.cache.set(key, value);
    }

    pub fn set_until_next_refresh_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.cache.set_with_ttl(key, value, ttl);
    }

    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.cache.delete(key)
    }

    pub fn clear(&self) {
        self.inner.cache.clear();
    }

    pub fn cleanup(&self) -> usize {
        self.inner.cache.cleanup()
    }

    /// Stop automatic refreshes and clear the store.
    ///
    /// Safe to call repeatedly. Once this returns, the timer never starts
    /// another refresh, and an automatic refresh still in flight settles
    /// without touching the store. Manual
    /// [`fetch_all`](BatchFetchCache::fetch_all) calls keep working.
    pub fn shutdown(&self) {
        self.inner.refresh.lock().stopped = true;
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
            info!("stopped cache refresh timer");
        }
        self.inner.cache.clear();
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.lock().cycle.is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.refresh.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.cache.stats()
    }
}

/// Join the in-flight cycle or start a new one.
///
/// Returns `None` only for timer triggers after shutdown. The stop flag is
/// read under the same lock `shutdown` sets it with. A new cycle is spawned
/// onto the current runtime, if any, so it completes even when every caller
/// stops awaiting it.
fn begin_refresh<K, V>(inner: &Inner<K, V>, trigger: Trigger) -> Option<RefreshCycle>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let cycle = {
        let mut state = inner.refresh.lock();
        if trigger == Trigger::Timer && state.stopped {
            return None;
        }
        if let Some(cycle) = &state.cycle {
            inner.cache.stats_ref().record_coalesced();
            debug!(?trigger, "joined in-flight cache refresh");
            return Some(cycle.clone());
        }

        let cycle = refresh_cycle(inner, trigger);
        state.cycle = Some(cycle.clone());
        cycle
    };

    if let Ok(runtime) = Handle::try_current() {
        runtime.spawn(cycle.clone());
    }
    Some(cycle)
}

/// Build one refresh cycle. The bulk fetch function runs on first poll.
fn refresh_cycle<K, V>(inner: &Inner<K, V>, trigger: Trigger) -> RefreshCycle
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let stats = inner.cache.stats_ref();
    stats.record_refresh();
    debug!(?trigger, "starting cache refresh");

    let fetcher = Arc::clone(&inner.fetcher);
    let cache = inner.cache.clone();
    let on_fetch_error = inner.on_fetch_error.clone();
    let refresh = Arc::clone(&inner.refresh);
    let slot = CycleSlot(Arc::clone(&inner.refresh));

    async move {
        let fetch = async move { fetcher().await };
        match AssertUnwindSafe(fetch).catch_unwind().await {
            Ok(Ok(items)) => {
                // Held across the replacement so `shutdown` either sees the
                // refreshed store and clears it, or stops this refresh first.
                let state = refresh.lock();
                if trigger.is_automatic() && state.stopped {
                    debug!(?trigger, "discarding cache refresh finished after shutdown");
                } else {
                    let stored = cache.replace_all(items);
                    debug!(stored, "cache refreshed");
                }
            }
            Ok(Err(source)) => {
                stats.record_refresh_error();
                on_fetch_error.handle(&CacheError::BatchFetch { source });
            }
            Err(_panic) => {
                stats.record_refresh_error();
                on_fetch_error.handle(&CacheError::Abandoned("refresh"));
            }
        }
        drop(slot);
    }
    .boxed()
    .shared()
}

/// Spawn the task that triggers a refresh every `interval`.
///
/// The task only holds a weak reference, so dropping the last cache handle
/// ends it as well.
fn spawn_refresh_timer<K, V>(
    runtime: &Handle,
    inner: Weak<Inner<K, V>>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let cycle = match inner.upgrade() {
                Some(inner) => begin_refresh(&inner, Trigger::Timer),
                None => None,
            };
            match cycle {
                Some(cycle) => cycle.await,
                None => break,
            }
        }
    })
}
