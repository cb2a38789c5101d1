//! Integration tests for the fetching caches, run on Tokio's paused clock.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use expiring_cache::{
    BatchConfig, BatchFetchCache, BoxError, CacheError, FetchCache, FetchConfig, FetchResult,
    SingleValueCache,
};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Route the caches' log output through the test harness; `RUST_LOG` filters it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache = FetchCache::new(
        move |_key: &'static str| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(Some(100))
            }
        },
        FetchConfig::default(),
    );

    let (a, b, c) = futures::join!(cache.get("k"), cache.get("k"), cache.get("k"));

    assert_eq!((a, b, c), (Some(100), Some(100), Some(100)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get_sync("k"), Some(100));
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_see_the_same_failure() {
    init_tracing();
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();
    let config = FetchConfig::new()
        .on_fetch_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let cache = FetchCache::new(
        |_key: u64| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Option<u64>, BoxError>(io::Error::new(io::ErrorKind::Other, "boom").into())
        },
        config,
    );

    let results = futures::future::join_all((0..5).map(|_| cache.get(9))).await;

    assert!(results.iter().all(Option::is_none));
    // One fetch, so the handler ran once for all five callers.
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(cache.pending_fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_fetch_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache = FetchCache::new(
        move |key: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, BoxError>(Some(key * 2))
            }
        },
        FetchConfig::default(),
    );

    let (a, b, a2) = futures::join!(cache.get(1), cache.get(2), cache.get(1));

    assert_eq!((a, b, a2), (Some(2), Some(4), Some(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn fetched_values_expire_and_evict() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let config = FetchConfig::new()
        .default_ttl(Duration::from_millis(100))
        .max_size(2)
        .build();
    let cache = FetchCache::new(
        move |key: char| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, BoxError>(Some(key.to_ascii_uppercase())) }
        },
        config,
    );

    cache.get('a').await;
    cache.get('b').await;
    cache.get('c').await;
    assert_eq!(cache.get_sync(&'a'), None);
    assert_eq!(cache.get_sync(&'b'), Some('B'));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get_sync(&'c'), None);
    assert_eq!(cache.get('c').await, Some('C'));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn batch_scenario_interval_refresh() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let config = BatchConfig::new()
        .refresh_interval(Duration::from_millis(100))
        .build();
    let cache = BatchFetchCache::new(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, BoxError>(vec![("counter", n)]) }
        },
        config,
    );

    assert_eq!(cache.get("counter").await, Some(1));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get("counter").await, Some(2));

    cache.shutdown();
}

#[tokio::test]
async fn batch_reader_waits_for_in_flight_refresh() {
    let gate = Arc::new(Notify::new());
    let release = gate.clone();
    let generation = Arc::new(AtomicUsize::new(0));
    let counter = generation.clone();
    let config = BatchConfig::new().fetch_on_start(false).build();
    let cache = BatchFetchCache::new(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let gate = gate.clone();
            async move {
                if n > 0 {
                    gate.notified().await;
                }
                Ok::<_, BoxError>((0..3u32).map(|k| (k, n)).collect::<Vec<_>>())
            }
        },
        config,
    );
    cache.fetch_all().await;
    assert_eq!(cache.get_sync(&0u32), Some(0));

    let observed = Arc::new(Mutex::new(Vec::new()));
    let refresh = cache.fetch_all();
    let read = async {
        let value = cache.get(&2u32).await;
        observed.lock().unwrap().push(value);
    };
    let check = async {
        tokio::task::yield_now().await;
        // The reader is parked behind the refresh, the store is untouched.
        assert!(cache.is_refreshing());
        assert_eq!(cache.get_sync(&2u32), Some(0));
        assert!(observed.lock().unwrap().is_empty());
        release.notify_one();
    };
    futures::join!(refresh, read, check);

    assert_eq!(*observed.lock().unwrap(), vec![Some(1)]);
}

#[tokio::test]
async fn batch_failure_keeps_previous_values() {
    init_tracing();
    let fail = Arc::new(AtomicUsize::new(0));
    let toggle = fail.clone();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let config = BatchConfig::new()
        .on_fetch_error(move |err: &CacheError| sink.lock().unwrap().push(err.to_string()))
        .build();
    let cache = BatchFetchCache::new(
        move || {
            let failing = toggle.load(Ordering::SeqCst) > 0;
            async move {
                let result: FetchResult<Vec<(String, u8)>> = if failing {
                    Err("source unavailable".into())
                } else {
                    Ok(vec![("x".to_string(), 1), ("y".to_string(), 2)])
                };
                result
            }
        },
        config,
    );
    assert_eq!(cache.get("x").await, Some(1));

    fail.store(1, Ordering::SeqCst);
    cache.fetch_all().await;

    assert_eq!(cache.get("x").await, Some(1));
    assert_eq!(cache.get("y").await, Some(2));
    assert_eq!(
        *errors.lock().unwrap(),
        vec!["bulk fetch failed: source unavailable".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn batch_entries_use_default_ttl() {
    let config = BatchConfig::new()
        .default_ttl(Duration::from_millis(100))
        .build();
    let cache = BatchFetchCache::new(
        || async { Ok::<_, BoxError>(vec![(1u8, "one")]) },
        config,
    );

    assert_eq!(cache.get(&1u8).await, Some("one"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get(&1u8).await, None);
}

#[tokio::test(start_paused = true)]
async fn single_value_scenario() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let config = BatchConfig::new()
        .refresh_interval(Duration::from_millis(100))
        .build();
    let cache = SingleValueCache::new(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, BoxError>(n) }
        },
        config,
    );

    assert_eq!(cache.get().await, Some(1));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get().await, Some(2));

    cache.shutdown();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get_sync(), None);
}
