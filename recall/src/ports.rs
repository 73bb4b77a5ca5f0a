use crate::domain::{Access, AccessKind};
use async_trait::async_trait;
use shared::Result;

// Ports are the pluggable extension points the cache engine composes: the
// origin values are fetched from, the store they are kept in, and the ledger
// that tracks when each key was touched.

/// Port for obtaining a fresh value from its source, normally the network.
///
/// A fetcher is unaware of the cache in front of it and must leave no caching
/// side effects of its own; a failed fetch is propagated as-is and nothing is
/// stored.
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync + 'static {
    async fn fetch(&self, key: &K) -> Result<V>;
}

/// Port for durably persisting cached values.
#[async_trait]
pub trait Storage<K, V>: Send + Sync + 'static {
    /// Whether a value is currently stored for `key`. No side effects.
    async fn contains(&self, key: &K) -> Result<bool>;

    /// Returns the stored value, failing with [`shared::Error::NotFound`]
    /// when `contains` would be false. Callers are expected to guard with
    /// `contains` first.
    async fn get(&self, key: &K) -> Result<V>;

    /// Upserts the value, replacing any prior value for the same key.
    async fn store(&self, key: &K, value: &V) -> Result<()>;

    /// Deletes the value if present; a no-op otherwise.
    async fn remove(&self, key: &K) -> Result<()>;

    /// Deletes all values.
    async fn clear(&self) -> Result<()>;
}

/// Port for the durable record of per-key access times.
///
/// The ledger must outlive the process: expiration decisions have to stay
/// correct across application restarts, so a value fetched yesterday is still
/// judged stale today even though the in-memory cache object was recreated.
#[async_trait]
pub trait AccessLedger<K>: Send + Sync + 'static {
    /// Returns the record for `(key, kind)` if one exists.
    async fn select(&self, key: &K, kind: AccessKind) -> Result<Option<Access<K>>>;

    /// Writes the record for `(access.key, access.kind)`, replacing any
    /// existing one.
    async fn upsert(&self, access: Access<K>) -> Result<()>;

    /// Drops every record for `key`, regardless of kind.
    async fn remove(&self, key: &K) -> Result<()>;

    /// Drops all records.
    async fn clear(&self) -> Result<()>;

    /// Flushes outstanding writes and releases the backing persistence
    /// handle. Behavior of other operations after this call is undefined.
    async fn terminate(&self) -> Result<()>;
}
