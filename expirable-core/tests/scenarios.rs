use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use expirable_core::{
    ExpirableMap, ExpirableStore, Expiry, ManualClock, StoreConfig, StoreError,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "expirable_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn manual_store() -> (ExpirableStore<String, i32>, ManualClock) {
    let clock = ManualClock::new();
    let config = StoreConfig::default().without_background_sweep();
    (ExpirableStore::with_clock(config, clock.clone()), clock)
}

fn record_evictions(store: &ExpirableStore<String, i32>) -> Arc<Mutex<Vec<(String, i32)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.on_evict(move |key: &String, value: &i32| {
        sink.lock().unwrap().push((key.clone(), *value));
    });
    seen
}

#[test]
fn short_ttl_entry_expires_with_real_time() {
    init_tracing();
    let store: ExpirableStore<String, i32> =
        ExpirableStore::with_config(StoreConfig::default().without_background_sweep());
    let seen = record_evictions(&store);

    store.add("a".to_string(), 1, Duration::from_millis(50)).unwrap();
    assert_eq!(store.try_get("a"), Some(1));

    thread::sleep(Duration::from_millis(60));

    assert_eq!(store.try_get("a"), None);
    assert_eq!(store.try_get("a"), None);
    assert_eq!(*seen.lock().unwrap(), vec![("a".to_string(), 1)]);
}

#[test]
fn max_duration_entry_never_expires() {
    init_tracing();
    let (store, clock) = manual_store();

    store.add("b".to_string(), 2, Duration::MAX).unwrap();
    clock.advance(Duration::from_secs(1));
    assert_eq!(store.try_get("b"), Some(2));

    clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    assert_eq!(store.try_get("b"), Some(2));
    assert_eq!(store.time_to_live("b"), Some(Duration::MAX));
}

#[test]
fn duplicate_add_fails_but_set_overwrites() {
    init_tracing();
    let (store, _clock) = manual_store();

    store.add_default("c".to_string(), 1).unwrap();
    assert_eq!(
        store.add_default("c".to_string(), 2),
        Err(StoreError::DuplicateKey)
    );

    store.set_default("c".to_string(), 2);
    assert_eq!(store.try_get("c"), Some(2));
}

#[test]
fn expiry_boundary_is_consistent() {
    let (store, clock) = manual_store();
    let ttl = Duration::from_millis(500);
    store.set("k".to_string(), 1, ttl);

    clock.advance(Duration::from_millis(499));
    assert_eq!(store.try_get("k"), Some(1));

    // Exactly at the deadline the entry is still live
    clock.advance(Duration::from_millis(1));
    assert_eq!(store.try_get("k"), Some(1));

    clock.advance(Duration::from_nanos(1));
    assert_eq!(store.try_get("k"), None);
}

#[test]
fn each_evicted_entry_notifies_exactly_once() {
    let (store, clock) = manual_store();
    let seen = record_evictions(&store);

    for i in 0..10 {
        store.set(format!("key{}", i), i, Duration::from_secs(1));
    }
    clock.advance(Duration::from_secs(2));

    // Every eviction path observes the same entries
    let _ = store.try_get("key0");
    assert!(!store.contains_key("key1"));
    assert!(!store.update("key2", Duration::from_secs(60)));
    assert_eq!(store.sweep(), 0);
    assert!(store.keys().is_empty());

    let mut evicted = seen.lock().unwrap().clone();
    evicted.sort();
    let expected: Vec<(String, i32)> = {
        let mut all: Vec<_> = (0..10).map(|i| (format!("key{}", i), i)).collect();
        all.sort();
        all
    };
    assert_eq!(evicted, expected);
}

#[test]
fn remove_never_notifies() {
    let (store, clock) = manual_store();
    let seen = record_evictions(&store);

    store.set("a".to_string(), 1, Duration::from_secs(1));
    store.set("b".to_string(), 2, Duration::from_secs(60));
    clock.advance(Duration::from_secs(2));

    assert!(store.remove("a"));
    assert!(store.remove("b"));
    assert_eq!(store.sweep(), 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn sweep_twice_evicts_nothing_new() {
    let (store, clock) = manual_store();
    store.set("x".to_string(), 1, Duration::from_secs(1));
    store.set("y".to_string(), 2, Duration::from_secs(3));
    clock.advance(Duration::from_secs(2));

    assert_eq!(store.sweep(), 1);
    assert_eq!(store.sweep(), 0);
    assert_eq!(store.len(), 1);
}

#[test]
fn touch_counts_from_the_update_not_the_insert() {
    let (store, clock) = manual_store();
    store.set("s".to_string(), 1, Duration::from_secs(10));

    clock.advance(Duration::from_secs(7));
    assert!(store.update("s", Duration::from_secs(5)));

    // 11s after insert, 4s after update
    clock.advance(Duration::from_secs(4));
    assert_eq!(store.try_get("s"), Some(1));

    // 13s after insert, 6s after update
    clock.advance(Duration::from_secs(2));
    assert_eq!(store.try_get("s"), None);
}

#[test]
fn distinct_keys_expire_independently() {
    let (store, clock) = manual_store();
    store.set("one".to_string(), 1, Duration::from_secs(1));
    store.set("two".to_string(), 2, Duration::from_secs(2));
    store.set("three".to_string(), 3, Duration::from_secs(3));

    // Each deadline is still live at its exact instant
    for (elapsed, live) in [(1, 3), (2, 2), (3, 1), (4, 0)] {
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.len(), live, "after {}s", elapsed);
    }
}

#[test]
fn unsynchronized_map_matches_store_semantics() {
    let clock = ManualClock::new();
    let mut map: ExpirableMap<&'static str, Vec<u8>> =
        ExpirableMap::with_clock(StoreConfig::default(), clock.clone());

    map.add("bytes", vec![1, 2, 3], Expiry::After(Duration::from_secs(1)))
        .unwrap();
    map.add("pinned", vec![9], Expiry::Never).unwrap();
    assert_eq!(map.add("bytes", vec![], Expiry::Never), Err(StoreError::DuplicateKey));

    clock.advance(Duration::from_secs(2));
    assert_eq!(map.get("bytes"), Err(StoreError::KeyNotFound));
    assert_eq!(map.iter().count(), 1);
    assert_eq!(map.try_get("pinned"), Some(&vec![9]));
}

#[tokio::test(start_paused = true)]
async fn background_sweep_evicts_without_callers() {
    init_tracing();
    let clock = ManualClock::new();
    let store = ExpirableStore::with_clock(
        StoreConfig::default().with_sweep_interval(Duration::from_millis(25)),
        clock.clone(),
    );
    let seen = record_evictions(&store);

    store.set("idle".to_string(), 5, Duration::from_secs(1));
    clock.advance(Duration::from_secs(2));

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.stored_len(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![("idle".to_string(), 5)]);
}
