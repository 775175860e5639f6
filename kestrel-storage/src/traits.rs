//! Key-value store trait and usage statistics.
//!
//! The store is the injected persistence capability shared by every query
//! instance. Values are opaque bytes; JSON helpers live in the crate root.

use async_trait::async_trait;
use kestrel_core::KestrelResult;

/// Pluggable key-value persistence.
///
/// Implementations must be safe to share across all query instances.
/// Keys are expected to be collision-free (see [`crate::ScopedKey`]), so
/// no coordination between writers is required.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> KestrelResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> KestrelResult<()>;

    /// Remove `key`. Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> KestrelResult<bool>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> KestrelResult<u64>;

    /// Get store statistics.
    async fn stats(&self) -> KestrelResult<StoreStats>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of reads that found a value.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of successful writes.
    pub writes: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Total bytes written since creation.
    pub bytes_written: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stats_hit_rate() {
        let stats = StoreStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = StoreStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
