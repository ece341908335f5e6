//! # Expirable Core
//!
//! An in-memory key/value store whose entries expire individually.
//!
//! ## Features
//!
//! - Per-entry expiration by relative TTL or absolute deadline
//! - Expired entries are invisible to every read and evicted lazily on access
//! - Eviction listeners fire exactly once for every entry removed because it expired
//! - Optional background sweep task for each shared store instance
//! - Injectable clock for deterministic expiry
//!
//! Two flavours share the same semantics:
//!
//! - [`ExpirableMap`] - unsynchronized, `&mut self` everywhere
//! - [`ExpirableStore`] - cloneable handle, one coarse lock, background sweep
//!
//! Reads mutate: `try_get`, `contains_key`, `len`, `keys` and the other views
//! may evict expired entries (and fire listeners) as a side effect.
//!
//! ## Example
//!
//! ```rust,no_run
//! use expirable_core::{ExpirableStore, StoreConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Sweep expired entries every 30 seconds, default TTL of 5 minutes
//!     let config = StoreConfig::default()
//!         .with_default_ttl(Duration::from_secs(300))
//!         .with_sweep_interval(Duration::from_secs(30));
//!     let store: ExpirableStore<String, u64> = ExpirableStore::with_config(config);
//!
//!     store.on_evict(|key, value| println!("{} expired (was {})", key, value));
//!
//!     // Strict insert fails on a live duplicate
//!     store.add("user:123".to_string(), 42, Duration::from_secs(60)).unwrap();
//!     assert!(store.add_default("user:123".to_string(), 7).is_err());
//!
//!     // Retrieve the value, extending its life by another minute
//!     if let Some(value) = store.try_get_and_touch("user:123", Duration::from_secs(60)) {
//!         println!("User: {}", value);
//!     }
//!
//!     // Manual sweep (also done automatically by the background task)
//!     let removed_count = store.sweep();
//! }
//! ```

mod clock;
mod config;
mod entry;
mod error;
mod listener;
mod map;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, DEFAULT_TTL_ENV, SWEEP_INTERVAL_ENV};
pub use entry::{ExpirableItem, Expiry};
pub use error::StoreError;
pub use listener::ListenerId;
pub use map::ExpirableMap;
pub use store::ExpirableStore;
