//! A periodically refreshed cache holding exactly one value.

use std::future::Future;
use std::time::Duration;

use futures::future::FutureExt;

use crate::batch::BatchFetchCache;
use crate::config::BatchConfig;
use crate::error::FetchResult;
use crate::stats::StatsSnapshot;

/// A [`BatchFetchCache`] holding a single value under a hidden key.
///
/// The fetch function produces the value itself; it is stored as a one-entry
/// batch on every refresh.
///
/// # Example
/// ```
/// use expiring_cache::{BatchConfig, BoxError, SingleValueCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = SingleValueCache::new(
///     || async { Ok::<_, BoxError>(String::from("v1")) },
///     BatchConfig::default(),
/// );
///
/// assert_eq!(config.get().await.as_deref(), Some("v1"));
/// # }
/// ```
#[derive(Debug)]
pub struct SingleValueCache<V> {
    inner: BatchFetchCache<(), V>,
}

impl<V> Clone for SingleValueCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> SingleValueCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache backed by `fetcher`.
    pub fn new<F, Fut>(fetcher: F, config: BatchConfig) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let batch = move || fetcher().map(|result| result.map(|value| vec![((), value)]));
        Self {
            inner: BatchFetchCache::new(batch, config),
        }
    }

    /// Get the value, waiting for an in-flight refresh to settle first.
    pub async fn get(&self) -> Option<V> {
        self.inner.get(&()).await
    }

    /// Read the value without waiting for a refresh.
    pub fn get_sync(&self) -> Option<V> {
        self.inner.get_sync(&())
    }

    /// Override the value until the next successful refresh.
    pub fn set_until_next_refresh(&self, value: V) {
        self.inner.set_until_next_refresh((), value);
    }

    pub fn set_until_next_refresh_with_ttl(&self, value: V, ttl: Duration) {
        self.inner.set_until_next_refresh_with_ttl((), value, ttl);
    }

    pub async fn fetch_all(&self) {
        self.inner.fetch_all().await;
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.is_refreshing()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }
}
