//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries and test harnesses that
//! embed Kestrel call [`init_tracing`] once to get them on stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ConfigError, KestrelResult};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one line per event.
    Plain,
    /// One JSON object per event.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directive, e.g. `kestrel_query=debug,info`.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl TracingConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `KESTREL_LOG`: filter directive (default: "info")
    /// - `KESTREL_LOG_FORMAT`: "json" or "plain" (default: plain)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("KESTREL_LOG").unwrap_or(defaults.filter),
            format: match std::env::var("KESTREL_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => defaults.format,
            },
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already installed.
pub fn init_tracing(config: &TracingConfig) -> KestrelResult<()> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::InvalidValue {
        field: "filter".to_string(),
        value: config.filter.clone(),
        reason: e.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Plain => registry.with(fmt::layer()).try_init(),
    };

    result.map_err(|e| {
        ConfigError::Telemetry {
            reason: e.to_string(),
        }
        .into()
    })
}
