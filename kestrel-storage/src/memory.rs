//! In-memory key-value store.
//!
//! Used by tests and by embedders that only want session-scoped caching.

use std::collections::HashMap;

use async_trait::async_trait;
use kestrel_core::KestrelResult;

use crate::traits::{KvStore, StoreStats};

/// In-memory store backed by a `HashMap`.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: tokio::sync::RwLock<HashMap<String, Vec<u8>>>,
    stats: tokio::sync::RwLock<StoreStats>,
}

impl InMemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> KestrelResult<Option<Vec<u8>>> {
        let value = self.entries.read().await.get(key).cloned();
        let mut stats = self.stats.write().await;
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> KestrelResult<()> {
        let is_new = self
            .entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec())
            .is_none();

        let mut stats = self.stats.write().await;
        stats.writes += 1;
        stats.bytes_written += value.len() as u64;
        if is_new {
            stats.entry_count += 1;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> KestrelResult<bool> {
        let deleted = self.entries.write().await.remove(key).is_some();
        if deleted {
            let mut stats = self.stats.write().await;
            stats.entry_count = stats.entry_count.saturating_sub(1);
        }
        Ok(deleted)
    }

    async fn delete_prefix(&self, prefix: &str) -> KestrelResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let deleted = (before - entries.len()) as u64;
        drop(entries);

        let mut stats = self.stats.write().await;
        stats.entry_count = stats.entry_count.saturating_sub(deleted);
        Ok(deleted)
    }

    async fn stats(&self) -> KestrelResult<StoreStats> {
        Ok(self.stats.read().await.clone())
    }
}
