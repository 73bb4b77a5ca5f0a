//! In-memory implementations of the ports.
//!
//! These hold everything behind a [`tokio::sync::RwLock`]ed map and lose
//! their contents on drop. They serve callers that want the expiration
//! policy without durability, and they back most of the engine's own tests.

use crate::domain::{Access, AccessKind};
use crate::ports::{AccessLedger, Storage};
use async_trait::async_trait;
use shared::{Error, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;

/// Non-durable [`Storage`] backed by a hash map.
#[derive(Debug)]
pub struct MemoryStorage<K, V> {
    values: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryStorage<K, V> {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryStorage<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Storage<K, V> for MemoryStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.values.read().await.contains_key(key))
    }

    async fn get(&self, key: &K) -> Result<V> {
        self.values
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn store(&self, key: &K, value: &V) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.clone(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.values.write().await.clear();
        Ok(())
    }
}

/// Non-durable [`AccessLedger`]. Expiration state kept here does not survive
/// a restart, so entries from a previous run are judged as missing records
/// and safely re-fetched.
#[derive(Debug)]
pub struct MemoryLedger<K> {
    records: RwLock<HashMap<(K, AccessKind), Duration>>,
}

impl<K> MemoryLedger<K> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<K> Default for MemoryLedger<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K> AccessLedger<K> for MemoryLedger<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    async fn select(&self, key: &K, kind: AccessKind) -> Result<Option<Access<K>>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(key.clone(), kind))
            .map(|time| Access::new(key.clone(), kind, *time)))
    }

    async fn upsert(&self, access: Access<K>) -> Result<()> {
        self.records
            .write()
            .await
            .insert((access.key, access.kind), access.time);
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<()> {
        let mut records = self.records.write().await;
        for kind in AccessKind::ALL {
            records.remove(&(key.clone(), kind));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        Ok(())
    }
}
