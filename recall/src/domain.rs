use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The two ways a cached value is touched, each tracked independently in the
/// access ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    /// The value was (re)created by a full fetch.
    Alive,
    /// The value was read or written.
    Idle,
}

impl AccessKind {
    pub const ALL: [AccessKind; 2] = [AccessKind::Alive, AccessKind::Idle];

    /// Stable name, used by ledger implementations that namespace their
    /// records per kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Alive => "alive",
            AccessKind::Idle => "idle",
        }
    }
}

/// A ledger record: the elapsed time at which `key` was last accessed as
/// `kind`. Exactly one record per `(key, kind)` pair exists for a live key;
/// writing another replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access<K> {
    pub key: K,
    pub kind: AccessKind,
    pub time: Duration,
}

impl<K> Access<K> {
    pub fn new(key: K, kind: AccessKind, time: Duration) -> Self {
        Self { key, kind, time }
    }
}

/// An expiration threshold: either a bounded window or no bound at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiration {
    After(Duration),
    Never,
}

impl Expiration {
    /// Whether a gap of `elapsed` has outlived this threshold.
    pub fn is_exceeded_by(&self, elapsed: Duration) -> bool {
        match self {
            Expiration::After(window) => elapsed > *window,
            Expiration::Never => false,
        }
    }
}

/// Instance-level configuration for a [`Cache`](crate::cache::Cache).
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Identifier for the cache, carried on its tracing events.
    pub name: String,
    /// Expiration threshold counted from the last read or write.
    pub time_to_idle: Expiration,
    /// Expiration threshold counted from the last full fetch, regardless of
    /// read activity.
    pub time_to_live: Expiration,
}

impl CacheConfig {
    pub const DEFAULT_TIME_TO_IDLE: Duration = Duration::from_secs(60);
    pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(30);

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_to_idle: Expiration::After(Self::DEFAULT_TIME_TO_IDLE),
            time_to_live: Expiration::After(Self::DEFAULT_TIME_TO_LIVE),
        }
    }
}
