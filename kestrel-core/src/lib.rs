//! Kestrel Core - Shared Types
//!
//! Errors, query keys, configuration and tracing setup used by every other
//! Kestrel crate. No I/O lives here.

pub mod config;
pub mod error;
pub mod key;
pub mod telemetry;

pub use config::QueryConfig;
pub use error::{ConfigError, KestrelError, KestrelResult, QueryError, StorageError};
pub use key::QueryKey;
pub use telemetry::{init_tracing, LogFormat, TracingConfig};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Unix time in milliseconds, the resolution envelopes are stamped with.
pub type TimestampMs = i64;

/// Current wall clock in unix milliseconds.
pub fn now_millis() -> TimestampMs {
    Utc::now().timestamp_millis()
}
