use std::time::{Duration, Instant};

/// How long an entry should live
///
/// Any API taking `impl Into<Expiry>` accepts a bare [`Duration`] (relative
/// TTL) or [`Instant`] (absolute deadline).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expire once this much time has passed
    After(Duration),
    /// Expire once the clock passes this instant
    At(Instant),
    /// Never expire
    Never,
}

impl Expiry {
    /// Resolves to an absolute deadline, `None` meaning "never"
    ///
    /// `Duration::MAX` and deadlines that would overflow the clock's range
    /// both resolve to `None`.
    pub fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Expiry::After(ttl) if ttl == Duration::MAX => None,
            Expiry::After(ttl) => now.checked_add(ttl),
            Expiry::At(at) => Some(at),
            Expiry::Never => None,
        }
    }
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        Expiry::After(ttl)
    }
}

impl From<Instant> for Expiry {
    fn from(at: Instant) -> Self {
        Expiry::At(at)
    }
}

/// A stored value together with its expiration deadline
#[derive(Debug, Clone)]
pub struct ExpirableItem<V> {
    value: V,
    /// `None` pins the item to "never expires"
    expires_at: Option<Instant>,
}

impl<V> ExpirableItem<V> {
    /// Creates an item whose expiration is resolved against `now`
    pub fn new(value: V, expiry: Expiry, now: Instant) -> Self {
        Self {
            value,
            expires_at: expiry.deadline(now),
        }
    }

    /// Returns the stored value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the stored value mutably; expiration is unaffected
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Consumes the item and returns the value
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns the absolute deadline, `None` if the item never expires
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Remaining lifetime as seen from `now`
    ///
    /// Zero once expired, `Duration::MAX` for items that never expire.
    pub fn time_to_live(&self, now: Instant) -> Duration {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    /// Checks whether the item has expired at `now`
    ///
    /// The deadline itself still counts as live.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }

    /// Sets the expiration to `now + ttl`
    pub fn set_ttl(&mut self, ttl: Duration, now: Instant) {
        self.renew(Expiry::After(ttl), now);
    }

    /// Sets the expiration to an absolute deadline
    pub fn set_expiry(&mut self, at: Instant) {
        self.expires_at = Some(at);
    }

    /// Replaces the expiration with a freshly resolved one
    pub fn renew(&mut self, expiry: Expiry, now: Instant) {
        self.expires_at = expiry.deadline(now);
    }
}
