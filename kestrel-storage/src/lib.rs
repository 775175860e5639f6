//! Kestrel Storage - Key-Value Persistence
//!
//! Defines the persistence capability injected into query instances, plus
//! in-memory and LMDB implementations. Query instances never own a store;
//! they share one by `Arc` and stay out of each other's way through
//! [`ScopedKey`] namespacing.

pub mod lmdb;
pub mod memory;
pub mod scoped_key;
pub mod traits;

pub use lmdb::{LmdbKvStore, LmdbStoreError};
pub use memory::InMemoryKvStore;
pub use scoped_key::ScopedKey;
pub use traits::{KvStore, StoreStats};

use kestrel_core::{KestrelResult, StorageError};
use serde::{de::DeserializeOwned, Serialize};

/// Load and deserialize a JSON value stored under `key`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &ScopedKey,
) -> KestrelResult<Option<T>> {
    let encoded = key.encode();
    match store.get(&encoded).await? {
        Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StorageError::Deserialization {
                key: encoded,
                reason: e.to_string(),
            }
            .into()
        }),
        None => Ok(None),
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn store_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &ScopedKey,
    value: &T,
) -> KestrelResult<()> {
    let encoded = key.encode();
    let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Serialization {
        key: encoded.clone(),
        reason: e.to_string(),
    })?;
    store.set(&encoded, &bytes).await
}
