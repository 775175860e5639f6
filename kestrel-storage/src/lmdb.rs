//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached query responses
//! survive process restarts. All entries live in the single unnamed
//! database; namespaces are expressed as key prefixes (see
//! [`crate::ScopedKey`]).
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and prefix scans
//! - Write transactions for `set`, `delete` and `delete_prefix`
//! - Statistics behind an `RwLock`

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use kestrel_core::{KestrelError, KestrelResult, StorageError};
use tracing::debug;

use crate::traits::{KvStore, StoreStats};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for KestrelError {
    fn from(e: LmdbStoreError) -> Self {
        KestrelError::Storage(StorageError::Backend {
            reason: e.to_string(),
        })
    }
}

/// LMDB-backed store.
///
/// # Example
///
/// ```ignore
/// use kestrel_storage::{KvStore, LmdbKvStore};
///
/// let store = LmdbKvStore::new("/tmp/kestrel-cache", 64)?;
/// store.set("cosmoshub-4/balances", b"{...}").await?;
/// let bytes = store.get("cosmoshub-4/balances").await?;
/// ```
pub struct LmdbKvStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<StoreStats>,
}

impl LmdbKvStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the files are not modified by anything else while it is open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        let entry_count = db
            .len(&wtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        debug!(
            path = %path.as_ref().display(),
            max_size_mb,
            entry_count,
            "opened LMDB store"
        );

        Ok(Self {
            env,
            db,
            stats: RwLock::new(StoreStats {
                entry_count,
                ..Default::default()
            }),
        })
    }

    fn record_read(&self, hit: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if hit {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for (key, _) in iter.flatten() {
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl KvStore for LmdbKvStore {
    async fn get(&self, key: &str) -> KestrelResult<Option<Vec<u8>>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, key.as_bytes()) {
            Ok(Some(bytes)) => {
                self.record_read(true);
                Ok(Some(bytes.to_vec()))
            }
            Ok(None) => {
                self.record_read(false);
                Ok(None)
            }
            Err(e) => {
                self.record_read(false);
                Err(LmdbStoreError::Transaction(e.to_string()).into())
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> KestrelResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let is_new = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
            .is_none();

        self.db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        if let Ok(mut stats) = self.stats.write() {
            stats.writes += 1;
            stats.bytes_written += value.len() as u64;
            if is_new {
                stats.entry_count += 1;
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> KestrelResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        if deleted {
            if let Ok(mut stats) = self.stats.write() {
                stats.entry_count = stats.entry_count.saturating_sub(1);
            }
        }

        Ok(deleted)
    }

    async fn delete_prefix(&self, prefix: &str) -> KestrelResult<u64> {
        let keys_to_delete = self.collect_keys_with_prefix(prefix.as_bytes())?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut deleted = 0u64;
        for key in &keys_to_delete {
            let removed = self
                .db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            if removed {
                deleted += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        if let Ok(mut stats) = self.stats.write() {
            stats.entry_count = stats.entry_count.saturating_sub(deleted);
        }

        debug!(prefix, deleted, "deleted keys by prefix");
        Ok(deleted)
    }

    async fn stats(&self) -> KestrelResult<StoreStats> {
        Ok(self.stats.read().map(|s| s.clone()).unwrap_or_default())
    }
}
