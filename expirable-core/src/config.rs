use std::time::Duration;

/// Environment variable holding the default TTL in milliseconds (0 = never expire)
pub const DEFAULT_TTL_ENV: &str = "EXPIRABLE_DEFAULT_TTL_MS";

/// Environment variable holding the sweep interval in milliseconds (0 = disabled)
pub const SWEEP_INTERVAL_ENV: &str = "EXPIRABLE_SWEEP_INTERVAL_MS";

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for an expirable dictionary
///
/// # Example
///
/// ```rust
/// use expirable_core::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_default_ttl(Duration::from_secs(300))
///     .with_sweep_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// TTL applied to inserts without an explicit expiry (default: 60 seconds)
    pub default_ttl: Duration,

    /// Interval between background sweeps (default: 15 seconds, `None` disables)
    pub sweep_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL used when an insert does not name one
    ///
    /// `Duration::MAX` makes such entries never expire.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the background sweep interval
    ///
    /// A zero interval disables the sweep.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = normalize_interval(Some(interval));
        self
    }

    /// Disables the background sweep; expired entries are then only removed
    /// when an operation observes them
    pub fn without_background_sweep(mut self) -> Self {
        self.sweep_interval = None;
        self
    }

    /// Loads configuration from environment variables
    ///
    /// Reads:
    /// - `EXPIRABLE_DEFAULT_TTL_MS` - default TTL in milliseconds, 0 for never (default 60000)
    /// - `EXPIRABLE_SWEEP_INTERVAL_MS` - sweep interval in milliseconds, 0 to disable (default 15000)
    ///
    /// Values that fail to parse fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |name: &str| lookup(name).and_then(|raw| raw.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let default_ttl = match millis(DEFAULT_TTL_ENV) {
            Some(0) => Duration::MAX,
            Some(ms) => Duration::from_millis(ms),
            None => defaults.default_ttl,
        };

        let sweep_interval = match millis(SWEEP_INTERVAL_ENV) {
            Some(ms) => normalize_interval(Some(Duration::from_millis(ms))),
            None => defaults.sweep_interval,
        };

        Self {
            default_ttl,
            sweep_interval,
        }
    }
}

/// Maps a zero interval to "disabled"; a zero-period ticker would spin
pub(crate) fn normalize_interval(interval: Option<Duration>) -> Option<Duration> {
    interval.filter(|period| !period.is_zero())
}
