//! Refetch policy.
//!
//! Refresh is pull-based: nothing here runs a timer. A consumer read (or an
//! explicit call) asks [`should_refetch`] whether the cached envelope is still
//! good enough.

use std::time::Duration;

use kestrel_core::TimestampMs;

use crate::envelope::ResponseEnvelope;

/// How fresh a read needs the cached envelope to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Accept a cached envelope no older than `max_age`.
    Window {
        /// Maximum acceptable envelope age.
        max_age: Duration,
    },
    /// Always refetch.
    Always,
}

impl Freshness {
    /// Accept envelopes up to `max_age` old.
    pub fn window(max_age: Duration) -> Self {
        Self::Window { max_age }
    }

    /// Returns true if this forces a refetch.
    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::window(Duration::from_secs(30))
    }
}

/// Whether a fresh fetch is warranted.
///
/// True when there is no envelope yet, when forced, when the envelope is
/// provisional, or when it is older than the window.
pub fn should_refetch<T>(
    last: Option<&ResponseEnvelope<T>>,
    now: TimestampMs,
    freshness: Freshness,
) -> bool {
    let Some(envelope) = last else {
        return true;
    };
    match freshness {
        Freshness::Always => true,
        Freshness::Window { max_age } => envelope.staled || envelope.age(now) > max_age,
    }
}
