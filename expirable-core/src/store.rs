use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, SystemClock};
use crate::config::{normalize_interval, StoreConfig};
use crate::entry::Expiry;
use crate::error::StoreError;
use crate::listener::ListenerId;
use crate::map::ExpirableMap;

/// What the background sweeper should be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepSchedule {
    Every(Duration),
    Paused,
    Shutdown,
}

impl SweepSchedule {
    fn from_interval(interval: Option<Duration>) -> Self {
        match normalize_interval(interval) {
            Some(period) => SweepSchedule::Every(period),
            None => SweepSchedule::Paused,
        }
    }
}

/// Internal shared state for the store
struct StoreInner<K, V> {
    map: Mutex<ExpirableMap<K, V>>,
    /// Current sweep schedule; the sweeper task watches it. Dropping the
    /// sender (with the last store handle) ends the task.
    schedule_tx: watch::Sender<SweepSchedule>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> StoreInner<K, V> {
    /// Locks the map, recovering from poisoning
    ///
    /// Listener panics are caught inside the map, so a poisoned lock can only
    /// come from a panic that left the map itself consistent.
    fn lock(&self) -> MutexGuard<'_, ExpirableMap<K, V>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe key/value store whose entries expire individually
///
/// A single mutex guards the whole map. Every operation, reads included,
/// holds it for its full duration because any of them may evict, and
/// eviction listeners run while it is held:
///
/// - a slow listener stalls every other caller and the background sweep
/// - a listener that calls back into the same store deadlocks
///
/// Cloning is cheap and every clone shares the same data.
///
/// When a sweep interval is configured and the store is created inside a
/// Tokio runtime, a background task sweeps expired entries on that period.
/// The task stops on [`shutdown`](Self::shutdown) or when the last handle is
/// dropped. Without a runtime, expired entries are only removed when an
/// operation observes them.
///
/// # Example
///
/// ```rust,no_run
/// use expirable_core::{ExpirableStore, StoreConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = StoreConfig::default()
///         .with_default_ttl(Duration::from_secs(300))
///         .with_sweep_interval(Duration::from_secs(30));
///     let store: ExpirableStore<String, String> = ExpirableStore::with_config(config);
///
///     store.on_evict(|key, _value| tracing::info!(%key, "session expired"));
///     store.set("session:42".to_string(), "alice".to_string(), Duration::from_secs(60));
///
///     if let Some(user) = store.try_get("session:42") {
///         println!("User: {}", user);
///     }
/// }
/// ```
pub struct ExpirableStore<K, V> {
    inner: Arc<StoreInner<K, V>>,
}

impl<K, V> Clone for ExpirableStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ExpirableStore<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Creates a store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with custom configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Creates a store reading time from `clock`
    ///
    /// The background sweep period is still measured by the Tokio timer;
    /// only expiry decisions use `clock`.
    pub fn with_clock(config: StoreConfig, clock: impl Clock + 'static) -> Self {
        let schedule = SweepSchedule::from_interval(config.sweep_interval);
        let (schedule_tx, _) = watch::channel(schedule);

        let store = Self {
            inner: Arc::new(StoreInner {
                map: Mutex::new(ExpirableMap::with_clock(config, clock)),
                schedule_tx,
                sweeper: Mutex::new(None),
            }),
        };

        if matches!(schedule, SweepSchedule::Every(_)) {
            store.ensure_sweeper();
        }
        store
    }

    /// Spawns the sweeper task unless one is already running
    fn ensure_sweeper(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if sweeper.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "no Tokio runtime available; background sweep disabled, \
                 expired entries are removed when accessed"
            );
            return;
        };

        let schedule_rx = self.inner.schedule_tx.subscribe();
        let inner = Arc::downgrade(&self.inner);
        *sweeper = Some(runtime.spawn(Self::sweep_task(inner, schedule_rx)));
    }

    /// Background task that periodically sweeps expired entries
    ///
    /// Holds only a weak reference so it never keeps the store alive.
    async fn sweep_task(inner: Weak<StoreInner<K, V>>, mut schedule_rx: watch::Receiver<SweepSchedule>) {
        loop {
            let schedule = *schedule_rx.borrow_and_update();
            let period = match schedule {
                SweepSchedule::Shutdown => break,
                SweepSchedule::Paused => {
                    if schedule_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                SweepSchedule::Every(period) => period,
            };

            tracing::info!(
                interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
                "background sweep armed"
            );
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick - we want to wait for the interval first
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(state) = inner.upgrade() else {
                            tracing::info!("store dropped; background sweep stopped");
                            return;
                        };
                        state.lock().sweep();
                    }
                    changed = schedule_rx.changed() => {
                        if changed.is_err() {
                            tracing::info!("store dropped; background sweep stopped");
                            return;
                        }
                        // Rearm with the new schedule
                        break;
                    }
                }
            }
        }
        tracing::info!("background sweep stopped");
    }

    /// Current background sweep interval, `None` when paused or shut down
    pub fn sweep_interval(&self) -> Option<Duration> {
        match *self.inner.schedule_tx.borrow() {
            SweepSchedule::Every(period) => Some(period),
            SweepSchedule::Paused | SweepSchedule::Shutdown => None,
        }
    }

    /// Changes the background sweep interval; takes effect immediately
    ///
    /// The ticker is rearmed, so the next sweep happens one full `interval`
    /// from now. `None` or a zero interval pauses sweeping. Ignored after
    /// [`shutdown`](Self::shutdown).
    pub fn set_sweep_interval(&self, interval: Option<Duration>) {
        let next = SweepSchedule::from_interval(interval);
        let mut rejected = false;

        self.inner.schedule_tx.send_if_modified(|current| {
            if *current == SweepSchedule::Shutdown {
                rejected = true;
                return false;
            }
            // Notify even when unchanged so the ticker restarts
            *current = next;
            true
        });

        if rejected {
            tracing::warn!("sweep interval changed after shutdown; ignored");
            return;
        }
        if matches!(next, SweepSchedule::Every(_)) {
            self.ensure_sweeper();
        }
    }

    /// Returns `true` while a background sweeper is scheduled to run
    pub fn is_sweeping(&self) -> bool {
        let scheduled = matches!(*self.inner.schedule_tx.borrow(), SweepSchedule::Every(_));
        let running = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        scheduled && running
    }

    /// Stops the background sweeper for good
    ///
    /// A sweep already in progress finishes; no new one is scheduled. This
    /// also happens automatically when the last handle is dropped.
    pub fn shutdown(&self) {
        self.inner.schedule_tx.send_replace(SweepSchedule::Shutdown);
    }

    /// TTL applied to inserts that do not name one
    pub fn default_ttl(&self) -> Duration {
        self.inner.lock().default_ttl()
    }

    /// Changes the TTL applied to future inserts
    pub fn set_default_ttl(&self, ttl: Duration) {
        self.inner.lock().set_default_ttl(ttl);
    }

    /// Registers a listener called for every entry evicted because it expired
    ///
    /// The listener runs while the store is locked and must not call back
    /// into this store.
    pub fn on_evict<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.inner.lock().on_evict(listener)
    }

    /// Unregisters a listener; returns `false` if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().remove_listener(id)
    }

    /// Inserts a new entry with an explicit TTL or deadline
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a live entry already uses `key`.
    pub fn add(&self, key: K, value: V, expiry: impl Into<Expiry>) -> Result<(), StoreError> {
        self.inner.lock().add(key, value, expiry)
    }

    /// Inserts a new entry with the default TTL
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a live entry already uses `key`.
    pub fn add_default(&self, key: K, value: V) -> Result<(), StoreError> {
        self.inner.lock().add_default(key, value)
    }

    /// Inserts or overwrites an entry with an explicit TTL or deadline
    pub fn set(&self, key: K, value: V, expiry: impl Into<Expiry>) {
        self.inner.lock().set(key, value, expiry);
    }

    /// Inserts or overwrites an entry with the default TTL
    pub fn set_default(&self, key: K, value: V) {
        self.inner.lock().set_default(key, value);
    }

    /// Retrieves a clone of the value if present and not expired
    ///
    /// Expired entries are evicted here and reported as absent.
    pub fn try_get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.lock().try_get(key).cloned()
    }

    /// Strict read: absence is an error
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyNotFound` if the key is absent or expired.
    pub fn get<Q>(&self, key: &Q) -> Result<V, StoreError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.lock().get(key).cloned()
    }

    /// Retrieves the value and refreshes its expiration (sliding expiration)
    pub fn try_get_and_touch<Q>(&self, key: &Q, expiry: impl Into<Expiry>) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.lock().try_get_and_touch(key, expiry).cloned()
    }

    /// Checks if a live entry exists
    ///
    /// Expired entries are evicted when checked.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().contains_key(key)
    }

    /// Refreshes a live entry's expiration, then sweeps every expired entry
    ///
    /// Returns whether an entry was refreshed.
    pub fn update<Q>(&self, key: &Q, expiry: impl Into<Expiry>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().update(key, expiry)
    }

    /// Deletes a key regardless of expiration, without notifying
    ///
    /// Returns `true` if the key existed.
    #[must_use = "returns whether the key existed"]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().remove(key)
    }

    /// Deletes all entries without notifying
    ///
    /// Returns the number of entries that were stored, expired ones included.
    pub fn clear(&self) -> usize {
        self.inner.lock().clear()
    }

    /// Evicts every expired entry now
    ///
    /// Returns the number of entries removed. The background task calls the
    /// same routine.
    pub fn sweep(&self) -> usize {
        self.inner.lock().sweep()
    }

    /// Returns the number of live entries; sweeps first
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if no live entries remain; sweeps first
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the number of stored entries, including expired ones not yet
    /// evicted
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.inner.lock().stored_len()
    }

    /// Returns all live keys; sweeps first
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.inner.lock().keys().cloned().collect()
    }

    /// Returns all live values; sweeps first
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.inner.lock().values().cloned().collect()
    }

    /// Returns every live entry; sweeps first
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.inner
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Returns the live value under `key`, inserting `factory()` with the
    /// default TTL when there is none
    ///
    /// `factory` runs under the store lock.
    pub fn get_or_insert_with<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> V,
        V: Clone,
    {
        self.inner.lock().get_or_insert_with(key, factory).clone()
    }

    /// Remaining lifetime of a live entry (`Duration::MAX` if it never expires)
    pub fn time_to_live<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().time_to_live(key)
    }

    /// Deadline of a live entry; `Some(None)` if it never expires
    pub fn expires_at<Q>(&self, key: &Q) -> Option<Option<Instant>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().expires_at(key)
    }
}

impl<K, V> Default for ExpirableStore<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ExpirableStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirableStore")
            .field("map", &*self.inner.lock())
            .field("schedule", &*self.inner.schedule_tx.borrow())
            .finish()
    }
}
