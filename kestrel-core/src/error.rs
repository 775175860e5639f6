//! Error types for Kestrel operations

use thiserror::Error;

/// Failures of a single query fetch.
///
/// These are recorded as state on the query (`last_error`) rather than
/// returned to the caller of `fetch()`, so the type is `Clone` and cheap
/// to hand out to observers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Transport error reaching {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Request to {endpoint} failed with status {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Decode error: {reason}")]
    Decode { reason: String },
}

impl QueryError {
    /// Build a transport error.
    pub fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a decode error.
    pub fn decode(reason: impl ToString) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures that happened before a response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e)
    }
}

/// Persistence layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to install tracing subscriber: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all Kestrel errors.
#[derive(Debug, Clone, Error)]
pub enum KestrelError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Kestrel operations.
pub type KestrelResult<T> = Result<T, KestrelError>;

// =============================================================================
// TESTS
// =============================================================================
