//! Response envelopes.
//!
//! An envelope is the cached result of one successful fetch. It is produced
//! exactly once per success and replaced wholesale by the next one; nothing
//! ever merges two envelopes.

use kestrel_core::{now_millis, TimestampMs};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a fetcher hands back on success, before it is stamped into an
/// envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    /// Decoded payload.
    pub data: T,
    /// Protocol status of the response (HTTP status for REST endpoints).
    pub status: u16,
    /// Whether the source reported the data as not current.
    pub staled: bool,
}

impl<T> Fetched<T> {
    /// A current response with status 200.
    pub fn ok(data: T) -> Self {
        Self {
            data,
            status: 200,
            staled: false,
        }
    }

    /// Override the status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Mark the response as provisional.
    pub fn with_staled(mut self, staled: bool) -> Self {
        self.staled = staled;
        self
    }
}

/// Cached result of one successful fetch.
///
/// `staled` marks data consumers may read but should treat as provisional:
/// the chain reported a non-current block, or the envelope was restored
/// from persistence and has not been refreshed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    /// Decoded payload.
    pub data: T,
    /// Protocol status of the response.
    pub status: u16,
    /// Whether the data is provisional.
    pub staled: bool,
    /// When the fetch completed, in unix milliseconds.
    pub timestamp: TimestampMs,
    /// Epoch of the fetch that produced this envelope.
    #[serde(default)]
    pub epoch: u64,
}

impl<T> ResponseEnvelope<T> {
    /// Stamp a fetch result with the current time.
    pub fn from_fetched(fetched: Fetched<T>, epoch: u64) -> Self {
        Self::from_fetched_at(fetched, epoch, now_millis())
    }

    /// Stamp a fetch result with an explicit time.
    pub fn from_fetched_at(fetched: Fetched<T>, epoch: u64, timestamp: TimestampMs) -> Self {
        Self {
            data: fetched.data,
            status: fetched.status,
            staled: fetched.staled,
            timestamp,
            epoch,
        }
    }

    /// Age of the envelope relative to `now`. Zero if `now` is earlier.
    pub fn age(&self, now: TimestampMs) -> Duration {
        u64::try_from(now.saturating_sub(self.timestamp))
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }

    /// Copy of this envelope marked provisional.
    pub fn into_staled(mut self) -> Self {
        self.staled = true;
        self
    }

    /// Map the payload, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> ResponseEnvelope<U>
    where
        F: FnOnce(T) -> U,
    {
        ResponseEnvelope {
            data: f(self.data),
            status: self.status,
            staled: self.staled,
            timestamp: self.timestamp,
            epoch: self.epoch,
        }
    }
}

impl<T> AsRef<T> for ResponseEnvelope<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_builders() {
        let fetched = Fetched::ok("x").with_status(203).with_staled(true);
        assert_eq!(fetched.status, 203);
        assert!(fetched.staled);
    }

    #[test]
    fn test_envelope_from_fetched() {
        let envelope = ResponseEnvelope::from_fetched_at(Fetched::ok(7u32), 3, 1_000);
        assert_eq!(envelope.data, 7);
        assert_eq!(envelope.status, 200);
        assert!(!envelope.staled);
        assert_eq!(envelope.timestamp, 1_000);
        assert_eq!(envelope.epoch, 3);
    }

    #[test]
    fn test_age() {
        let envelope = ResponseEnvelope::from_fetched_at(Fetched::ok(()), 1, 10_000);
        assert_eq!(envelope.age(12_500), Duration::from_millis(2_500));
        // Clock went backwards.
        assert_eq!(envelope.age(9_000), Duration::ZERO);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let envelope = ResponseEnvelope::from_fetched_at(Fetched::ok(42i32).with_staled(true), 5, 77);
        let mapped = envelope.map(|v| v.to_string());
        assert_eq!(mapped.data, "42");
        assert!(mapped.staled);
        assert_eq!(mapped.timestamp, 77);
        assert_eq!(mapped.epoch, 5);
    }

    #[test]
    fn test_serde_roundtrip_without_epoch() {
        let json = r#"{"data":"100","status":200,"staled":false,"timestamp":5}"#;
        let envelope: ResponseEnvelope<String> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.epoch, 0);
        assert_eq!(envelope.data, "100");
    }
}
