//! RPC transport for chain queries.

use std::time::Duration;

use async_trait::async_trait;
use kestrel_core::{ConfigError, KestrelResult, QueryError};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// A raw response from a chain endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// HTTP status (or the transport's equivalent).
    pub status: u16,
    /// Parsed JSON body.
    pub body: Value,
}

impl RpcResponse {
    /// A 200 response carrying `body`.
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Decode the body into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, QueryError> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Issues read requests against one chain endpoint.
///
/// Implementations return `Err` for anything that did not produce a usable
/// JSON body: connection failures, timeouts and non-success statuses.
#[async_trait]
pub trait RpcClient: Send + Sync + 'static {
    /// Base URL or other identifier of the endpoint, used in errors and logs.
    fn endpoint(&self) -> &str;

    /// GET `path` (starting with '/') and parse the JSON body.
    async fn query(&self, path: &str) -> Result<RpcResponse, QueryError>;
}

/// Default timeout for LCD requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for a Cosmos SDK LCD endpoint.
pub struct LcdClient {
    client: Client,
    base_url: String,
}

impl LcdClient {
    /// Create a client for `base_url` (e.g. "https://lcd.cosmoshub.example").
    ///
    /// # Arguments
    /// * `base_url` - LCD root; a trailing '/' is ignored
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> KestrelResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: base_url,
                reason: "LCD base URL must not be empty".to_string(),
            }
            .into());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::transport(&base_url, e))?;

        Ok(Self { client, base_url })
    }

    /// Create a client with [`DEFAULT_TIMEOUT`].
    pub fn with_default_timeout(base_url: impl Into<String>) -> KestrelResult<Self> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl RpcClient for LcdClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn query(&self, path: &str) -> Result<RpcResponse, QueryError> {
        let url = self.url(path);
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "LCD request failed");
            QueryError::transport(&url, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QueryError::Status {
                endpoint: url,
                status: status.as_u16(),
                message: error_message(&error_text),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| QueryError::decode(format!("invalid JSON from {}: {}", url, e)))?;

        Ok(RpcResponse {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for LcdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcdClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Pull `message` out of a Cosmos error body, falling back to the raw text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.to_string())
}
