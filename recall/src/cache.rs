use crate::clock::{ElapsedTimeProvider, SystemClock};
use crate::domain::{Access, AccessKind, CacheConfig, Expiration};
use crate::ports::{AccessLedger, Fetcher, Storage};
use dashmap::DashMap;
use shared::Result;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Freshness verdict for a key that is present in storage.
enum Freshness {
    Fresh,
    Expired,
}

/// Decides whether values are fetched from their origin or retrieved from
/// storage, keeping the access ledger consistent with what is stored.
///
/// Per key, an entry moves through `absent → fresh → expired → absent`;
/// the expired state is never observable by callers because `get` collapses
/// it into a re-fetch before returning. Reads within the idle window refresh
/// the idle timestamp only; the alive timestamp moves only on a full fetch.
pub struct Cache<K, V> {
    config: CacheConfig,
    fetcher: Arc<dyn Fetcher<K, V>>,
    storage: Arc<dyn Storage<K, V>>,
    ledger: Arc<dyn AccessLedger<K>>,
    clock: Arc<dyn ElapsedTimeProvider>,
    // One guard per key so concurrent gets of a cold key fetch once.
    flights: DashMap<K, Arc<Mutex<()>>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts building a cache over the given collaborators. Expiration
    /// defaults to [`CacheConfig::DEFAULT_TIME_TO_IDLE`] and
    /// [`CacheConfig::DEFAULT_TIME_TO_LIVE`]; the clock defaults to
    /// [`SystemClock`].
    pub fn builder(
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher<K, V>>,
        storage: Arc<dyn Storage<K, V>>,
        ledger: Arc<dyn AccessLedger<K>>,
    ) -> CacheBuilder<K, V> {
        CacheBuilder {
            config: CacheConfig::new(name),
            fetcher,
            storage,
            ledger,
            clock: Arc::new(SystemClock),
        }
    }

    /// Gets the value bound to `key`, either from storage when a fresh copy
    /// is held or through the fetcher otherwise, respecting both the
    /// time-to-idle and the time-to-live.
    ///
    /// Any fetcher, storage or ledger failure aborts the call and is
    /// propagated as-is; a failed fetch writes nothing.
    pub async fn get(&self, key: &K) -> Result<V> {
        let flight = self.flight(key);
        let guard = flight.lock().await;

        let result = self.evaluate(key).await;

        drop(guard);
        drop(flight);
        self.release_flight(key);
        result
    }

    /// Deletes the value bound to `key` and its ledger records. Idempotent.
    pub async fn remove(&self, key: &K) -> Result<()> {
        let flight = self.flight(key);
        let guard = flight.lock().await;

        let result = self.remove_locked(key).await;

        drop(guard);
        drop(flight);
        self.release_flight(key);
        result
    }

    /// Deletes all values and all ledger records.
    pub async fn clear(&self) -> Result<()> {
        self.storage.clear().await?;
        self.ledger.clear().await?;
        self.flights.clear();
        Ok(())
    }

    /// Clears everything and releases the ledger's persistence handle.
    /// Behavior of subsequent operations on this cache is undefined.
    pub async fn terminate(&self) -> Result<()> {
        self.clear().await?;
        self.ledger.terminate().await
    }

    fn flight(&self, key: &K) -> Arc<Mutex<()>> {
        self.flights.entry(key.clone()).or_default().value().clone()
    }

    /// Drops a key's flight guard once no caller holds it anymore, so the
    /// table does not grow with every key ever seen. The count is read under
    /// the shard lock, which `flight` also needs to hand out a new clone, so
    /// a guard cannot be revived while it is being removed.
    fn release_flight(&self, key: &K) {
        self.flights
            .remove_if(key, |_, flight| Arc::strong_count(flight) == 1);
    }

    async fn evaluate(&self, key: &K) -> Result<V> {
        let now = self.clock.provide();
        if self.storage.contains(key).await? {
            match self.freshness(key, now).await? {
                Freshness::Fresh => return self.retrieve(key, now).await,
                Freshness::Expired => {
                    tracing::debug!(cache = %self.config.name, "entry expired, discarding");
                    self.storage.remove(key).await?;
                }
            }
        }
        self.remember(key, now).await
    }

    async fn remove_locked(&self, key: &K) -> Result<()> {
        self.storage.remove(key).await?;
        self.ledger.remove(key).await
    }

    /// Judges a key that is present in storage against both expiration
    /// thresholds, using the single `now` sampled at the start of `get`.
    ///
    /// A missing or partial record pair, or a record dated after `now`,
    /// means the entry's freshness cannot be verified (e.g. a crash landed
    /// between the value write and the ledger writes); such an entry is
    /// expired rather than served.
    async fn freshness(&self, key: &K, now: Duration) -> Result<Freshness> {
        let alive = self.ledger.select(key, AccessKind::Alive).await?;
        let idle = self.ledger.select(key, AccessKind::Idle).await?;
        let (Some(alive), Some(idle)) = (alive, idle) else {
            tracing::warn!(
                cache = %self.config.name,
                "stored value has an incomplete access record pair"
            );
            return Ok(Freshness::Expired);
        };

        let (Some(age), Some(idle_gap)) =
            (now.checked_sub(alive.time), now.checked_sub(idle.time))
        else {
            return Ok(Freshness::Expired);
        };

        if self.config.time_to_idle.is_exceeded_by(idle_gap)
            || self.config.time_to_live.is_exceeded_by(age)
        {
            Ok(Freshness::Expired)
        } else {
            Ok(Freshness::Fresh)
        }
    }

    /// Warm path: reads the stored value and moves the idle timestamp
    /// forward to `now`.
    async fn retrieve(&self, key: &K, now: Duration) -> Result<V> {
        let value = self.storage.get(key).await?;
        self.ledger
            .upsert(Access::new(key.clone(), AccessKind::Idle, now))
            .await?;
        tracing::trace!(cache = %self.config.name, "warm hit");
        Ok(value)
    }

    /// Cold path: fetches, stores, then records both access kinds at `now`.
    ///
    /// No stage commits before its predecessor has: the store happens only
    /// after the fetch succeeded and the ledger writes only after the store
    /// succeeded, so an abort mid-sequence leaves at worst a value with an
    /// incomplete record pair, which `freshness` judges as expired.
    async fn remember(&self, key: &K, now: Duration) -> Result<V> {
        let value = self.fetcher.fetch(key).await?;
        self.storage.store(key, &value).await?;
        self.ledger
            .upsert(Access::new(key.clone(), AccessKind::Alive, now))
            .await?;
        self.ledger
            .upsert(Access::new(key.clone(), AccessKind::Idle, now))
            .await?;
        tracing::debug!(cache = %self.config.name, "fetched and stored");
        Ok(value)
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .finish()
    }
}

/// Builder returned by [`Cache::builder`].
pub struct CacheBuilder<K, V> {
    config: CacheConfig,
    fetcher: Arc<dyn Fetcher<K, V>>,
    storage: Arc<dyn Storage<K, V>>,
    ledger: Arc<dyn AccessLedger<K>>,
    clock: Arc<dyn ElapsedTimeProvider>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn time_to_idle(mut self, expiration: Expiration) -> Self {
        self.config.time_to_idle = expiration;
        self
    }

    pub fn time_to_live(mut self, expiration: Expiration) -> Self {
        self.config.time_to_live = expiration;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn ElapsedTimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Cache<K, V> {
        Cache {
            config: self.config,
            fetcher: self.fetcher,
            storage: self.storage,
            ledger: self.ledger,
            clock: self.clock,
            flights: DashMap::new(),
        }
    }
}
