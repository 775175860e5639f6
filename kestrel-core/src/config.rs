//! Configuration types

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{ConfigError, KestrelError, KestrelResult};

/// Configuration shared by every query created from a map or store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum age of a cached envelope before a pull-based refresh refetches it.
    pub freshness_window: Duration,
    /// Upper bound on query instances retained by a single map.
    pub max_cached_queries: usize,
    /// Whether successful responses are written to the attached key-value store.
    pub persist_responses: bool,
    /// How far a chain's latest block may lag wall clock before its data is staled.
    pub stale_block_threshold: Duration,
    /// Prefix under which persisted envelopes are scoped.
    pub namespace: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(30),
            max_cached_queries: 512,
            persist_responses: true,
            stale_block_threshold: Duration::from_secs(120),
            namespace: "kestrel".to_string(),
        }
    }
}

impl QueryConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the per-map instance bound.
    pub fn with_max_cached_queries(mut self, max: usize) -> Self {
        self.max_cached_queries = max;
        self
    }

    /// Enable or disable response persistence.
    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persist_responses = enabled;
        self
    }

    /// Set the stale block threshold.
    pub fn with_stale_block_threshold(mut self, threshold: Duration) -> Self {
        self.stale_block_threshold = threshold;
        self
    }

    /// Set the persistence namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `KESTREL_FRESHNESS_WINDOW_MS`: Freshness window in milliseconds (default: 30000)
    /// - `KESTREL_MAX_CACHED_QUERIES`: Instances retained per map (default: 512)
    /// - `KESTREL_PERSIST_RESPONSES`: "true"/"1" or "false"/"0" (default: true)
    /// - `KESTREL_STALE_BLOCK_THRESHOLD_MS`: Block lag tolerance in milliseconds (default: 120000)
    /// - `KESTREL_CACHE_NAMESPACE`: Persistence namespace (default: "kestrel")
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            freshness_window: env_parse("KESTREL_FRESHNESS_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.freshness_window),
            max_cached_queries: env_parse("KESTREL_MAX_CACHED_QUERIES")
                .unwrap_or(defaults.max_cached_queries),
            persist_responses: std::env::var("KESTREL_PERSIST_RESPONSES")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.persist_responses),
            stale_block_threshold: env_parse("KESTREL_STALE_BLOCK_THRESHOLD_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stale_block_threshold),
            namespace: std::env::var("KESTREL_CACHE_NAMESPACE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.namespace),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_cached_queries > 0
    /// - stale_block_threshold is positive
    /// - namespace is non-empty and contains no '/'
    pub fn validate(&self) -> KestrelResult<()> {
        if self.max_cached_queries == 0 {
            return Err(KestrelError::Config(ConfigError::InvalidValue {
                field: "max_cached_queries".to_string(),
                value: self.max_cached_queries.to_string(),
                reason: "max_cached_queries must be greater than 0".to_string(),
            }));
        }

        if self.stale_block_threshold.is_zero() {
            return Err(KestrelError::Config(ConfigError::InvalidValue {
                field: "stale_block_threshold".to_string(),
                value: format!("{:?}", self.stale_block_threshold),
                reason: "stale_block_threshold must be positive".to_string(),
            }));
        }

        if self.namespace.is_empty() || self.namespace.contains('/') {
            return Err(KestrelError::Config(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: self.namespace.clone(),
                reason: "namespace must be non-empty and must not contain '/'".to_string(),
            }));
        }

        Ok(())
    }
}

/// Read and parse an env var. Unset yields `None`; unparsable is logged and
/// also yields `None`.
fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
