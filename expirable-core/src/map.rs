use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::entry::{ExpirableItem, Expiry};
use crate::error::StoreError;
use crate::listener::{ListenerId, Listeners};

/// Unsynchronized key/value map whose entries expire individually
///
/// Expired entries are treated as absent by every operation. They are removed
/// lazily: a read that finds an expired entry evicts it, and `sweep` (run
/// explicitly, by `update`, or before any whole-map view) evicts all of them.
/// Each eviction fires the registered listeners exactly once with the removed
/// key and value.
///
/// # Reads mutate
///
/// `try_get`, `contains_key`, `len`, `keys` and friends take `&mut self`
/// because they may evict. Use [`ExpirableStore`](crate::ExpirableStore) when
/// the map has to be shared between threads.
///
/// # Example
///
/// ```rust
/// use expirable_core::{ExpirableMap, StoreConfig};
/// use std::time::Duration;
///
/// let mut map: ExpirableMap<String, u32> = ExpirableMap::with_config(StoreConfig::default());
/// map.on_evict(|key: &String, value: &u32| println!("{key} expired holding {value}"));
///
/// map.add("session".to_string(), 7, Duration::from_secs(30)).unwrap();
/// assert_eq!(map.try_get("session"), Some(&7));
/// ```
pub struct ExpirableMap<K, V> {
    entries: HashMap<K, ExpirableItem<V>>,
    default_ttl: Duration,
    listeners: Listeners<K, V>,
    clock: Arc<dyn Clock>,
}

impl<K, V> ExpirableMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty map with the default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty map using `config.default_ttl`
    ///
    /// The sweep interval is ignored here; only
    /// [`ExpirableStore`](crate::ExpirableStore) runs a background sweep.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Creates an empty map reading time from `clock`
    pub fn with_clock(config: StoreConfig, clock: impl Clock + 'static) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl: config.default_ttl,
            listeners: Listeners::new(),
            clock: Arc::new(clock),
        }
    }

    /// TTL applied to inserts that do not name one
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Changes the TTL applied to future inserts; existing entries keep theirs
    pub fn set_default_ttl(&mut self, ttl: Duration) {
        self.default_ttl = ttl;
    }

    /// Registers a listener called for every entry evicted because it expired
    ///
    /// Listeners are not called for `remove`, `clear` or overwrites by `set`.
    pub fn on_evict<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    /// Unregisters a listener; returns `false` if it was not registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Inserts a new entry with an explicit TTL or deadline
    ///
    /// An expired entry still stored under `key` is evicted first (listeners
    /// fire) and does not count as a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a live entry already uses `key`.
    pub fn add(&mut self, key: K, value: V, expiry: impl Into<Expiry>) -> Result<(), StoreError> {
        self.insert_new(key, value, expiry.into())
    }

    /// Inserts a new entry with the default TTL
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a live entry already uses `key`.
    pub fn add_default(&mut self, key: K, value: V) -> Result<(), StoreError> {
        let expiry = Expiry::After(self.default_ttl);
        self.insert_new(key, value, expiry)
    }

    fn insert_new(&mut self, key: K, value: V, expiry: Expiry) -> Result<(), StoreError> {
        let now = self.clock.now();
        if self.is_live(&key, now) {
            return Err(StoreError::DuplicateKey);
        }
        self.entries.insert(key, ExpirableItem::new(value, expiry, now));
        Ok(())
    }

    /// Inserts or overwrites an entry with the default TTL
    ///
    /// Never fails. A previous entry under `key` is replaced without an
    /// expiry check or notification.
    pub fn set_default(&mut self, key: K, value: V) {
        let expiry = Expiry::After(self.default_ttl);
        self.set(key, value, expiry);
    }

    /// Inserts or overwrites an entry with an explicit TTL or deadline
    pub fn set(&mut self, key: K, value: V, expiry: impl Into<Expiry>) {
        let now = self.clock.now();
        self.entries
            .insert(key, ExpirableItem::new(value, expiry.into(), now));
    }

    /// Returns the value if present and not expired
    ///
    /// An expired entry found here is evicted (listeners fire) and reported
    /// as absent.
    pub fn try_get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        if !self.is_live(key, now) {
            return None;
        }
        self.entries.get(key).map(ExpirableItem::value)
    }

    /// Strict read: like `try_get` but absence is an error
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyNotFound` if the key is absent or expired.
    pub fn get<Q>(&mut self, key: &Q) -> Result<&V, StoreError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.try_get(key).ok_or(StoreError::KeyNotFound)
    }

    /// Returns the value and refreshes its expiration (sliding expiration)
    pub fn try_get_and_touch<Q>(&mut self, key: &Q, expiry: impl Into<Expiry>) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        if !self.is_live(key, now) {
            return None;
        }
        let item = self.entries.get_mut(key)?;
        item.renew(expiry.into(), now);
        Some(item.value())
    }

    /// Checks for a live entry; may evict an expired one
    #[must_use]
    pub fn contains_key<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.try_get(key).is_some()
    }

    /// Refreshes the expiration of a live entry, then sweeps the whole map
    ///
    /// Returns whether an entry was refreshed. An entry that had already
    /// expired is not revived; the sweep evicts it.
    pub fn update<Q>(&mut self, key: &Q, expiry: impl Into<Expiry>) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let refreshed = match self.entries.get_mut(key) {
            Some(item) if !item.is_expired(now) => {
                item.renew(expiry.into(), now);
                true
            }
            _ => false,
        };
        self.sweep();
        refreshed
    }

    /// Removes an entry regardless of expiry; no notification
    #[must_use = "returns whether the key existed"]
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    /// Removes all entries without notifying; returns how many were stored
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Evicts every expired entry, notifying listeners for each
    ///
    /// Returns the number of entries evicted.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let listeners = &self.listeners;
        let mut removed = 0;

        self.entries.retain(|key, item| {
            if item.is_expired(now) {
                listeners.notify(key, item.value());
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            tracing::debug!(removed, "swept expired entries");
        }
        removed
    }

    /// Number of live entries; sweeps first
    #[must_use]
    pub fn len(&mut self) -> usize {
        self.sweep();
        self.entries.len()
    }

    /// Returns `true` if no live entries remain; sweeps first
    #[must_use]
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Number of stored entries, including expired ones not yet evicted
    ///
    /// Does not sweep.
    #[must_use]
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }

    /// Live keys, in unspecified order; sweeps first
    pub fn keys(&mut self) -> impl Iterator<Item = &K> + '_ {
        self.sweep();
        self.entries.keys()
    }

    /// Live values, in unspecified order; sweeps first
    pub fn values(&mut self) -> impl Iterator<Item = &V> + '_ {
        self.sweep();
        self.entries.values().map(ExpirableItem::value)
    }

    /// Live entries, in unspecified order; sweeps first
    pub fn iter(&mut self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.sweep();
        self.entries.iter().map(|(key, item)| (key, item.value()))
    }

    /// Returns the live value under `key`, inserting `factory()` with the
    /// default TTL when there is none
    pub fn get_or_insert_with<F>(&mut self, key: K, factory: F) -> &V
    where
        F: FnOnce() -> V,
    {
        let now = self.clock.now();
        // Evicts an expired entry so the factory result replaces it
        self.is_live(&key, now);
        let expiry = Expiry::After(self.default_ttl);
        self.entries
            .entry(key)
            .or_insert_with(|| ExpirableItem::new(factory(), expiry, now))
            .value()
    }

    /// Remaining lifetime of a live entry (`Duration::MAX` if it never expires)
    pub fn time_to_live<Q>(&mut self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        if !self.is_live(key, now) {
            return None;
        }
        self.entries.get(key).map(|item| item.time_to_live(now))
    }

    /// Deadline of a live entry
    ///
    /// `Some(None)` means the entry exists and never expires.
    pub fn expires_at<Q>(&mut self, key: &Q) -> Option<Option<Instant>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        if !self.is_live(key, now) {
            return None;
        }
        self.entries.get(key).map(ExpirableItem::expires_at)
    }

    /// Number of registered eviction listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Whether a live entry exists under `key`; evicts it if it has expired
    fn is_live<Q>(&mut self, key: &Q, now: Instant) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let expired = match self.entries.get(key) {
            Some(item) => item.is_expired(now),
            None => return false,
        };
        if expired {
            self.evict(key);
        }
        !expired
    }

    fn evict<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some((key, item)) = self.entries.remove_entry(key) {
            tracing::debug!("evicted expired entry on access");
            self.listeners.notify(&key, item.value());
        }
    }
}

impl<K, V> Default for ExpirableMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ExpirableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirableMap")
            .field("stored", &self.entries.len())
            .field("default_ttl", &self.default_ttl)
            .field("listeners", &self.listeners)
            .field("clock", &self.clock)
            .finish()
    }
}
