//! Latest block header via the Tendermint service.
//!
//! A node that stopped syncing keeps answering with an old block. The fetcher
//! compares the block time against the wall clock and marks the response
//! `staled` once the lag exceeds the configured threshold, so consumers can
//! still show the data while flagging it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use kestrel_core::{QueryConfig, QueryError, QueryKey, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::RpcClient;
use crate::envelope::Fetched;
use crate::fetcher::QueryFetcher;
use crate::map::ObservableQueryMap;
use crate::query::ObservableQuery;

/// The header fields kept from the latest block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    pub time: Timestamp,
}

#[derive(Deserialize)]
struct LatestBlockResponse {
    /// Present since SDK 0.47.
    sdk_block: Option<RawBlock>,
    block: Option<RawBlock>,
}

#[derive(Deserialize)]
struct RawBlock {
    header: RawHeader,
}

#[derive(Deserialize)]
struct RawHeader {
    chain_id: String,
    height: String,
    time: Timestamp,
}

impl TryFrom<RawHeader> for BlockHeader {
    type Error = QueryError;

    fn try_from(raw: RawHeader) -> Result<Self, Self::Error> {
        let height = raw
            .height
            .parse()
            .map_err(|e| QueryError::decode(format!("invalid block height {:?}: {}", raw.height, e)))?;
        Ok(Self {
            chain_id: raw.chain_id,
            height,
            time: raw.time,
        })
    }
}

/// Whether a block produced at `time` lags `now` by more than `threshold`.
pub fn is_lagging(time: Timestamp, now: Timestamp, threshold: Duration) -> bool {
    // A block time ahead of the local clock is never lagging.
    (now - time)
        .to_std()
        .map(|lag| lag > threshold)
        .unwrap_or(false)
}

/// Fetches the latest block header of one chain.
pub struct LatestBlockFetcher {
    client: Arc<dyn RpcClient>,
    chain_id: String,
    stale_threshold: Duration,
}

impl LatestBlockFetcher {
    pub const PATH: &'static str = "/cosmos/base/tendermint/v1beta1/blocks/latest";

    pub fn new(
        client: Arc<dyn RpcClient>,
        chain_id: impl Into<String>,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            client,
            chain_id: chain_id.into(),
            stale_threshold,
        }
    }
}

#[async_trait]
impl QueryFetcher for LatestBlockFetcher {
    type Output = BlockHeader;

    async fn fetch(&self) -> Result<Fetched<BlockHeader>, QueryError> {
        let response = self.client.query(Self::PATH).await?;
        let status = response.status;
        let decoded: LatestBlockResponse = response.decode()?;
        let raw = decoded
            .sdk_block
            .or(decoded.block)
            .ok_or_else(|| QueryError::decode("latest block response has no block"))?;
        let header = BlockHeader::try_from(raw.header)?;

        let staled = is_lagging(header.time, Utc::now(), self.stale_threshold);
        if staled {
            debug!(
                chain_id = %self.chain_id,
                height = header.height,
                block_time = %header.time,
                "latest block is behind the wall clock"
            );
        }

        Ok(Fetched::ok(header).with_status(status).with_staled(staled))
    }

    fn can_fetch(&self) -> bool {
        !self.chain_id.is_empty()
    }
}

pub type LatestBlockQuery = ObservableQuery<LatestBlockFetcher>;

/// Latest-block queries keyed by chain id.
pub type LatestBlockQueries = ObservableQueryMap<LatestBlockFetcher>;

impl ObservableQuery<LatestBlockFetcher> {
    /// Latest known height; 0 before the first successful fetch.
    pub fn height(&self) -> u64 {
        self.with_data(|data| data.map(|header| header.height).unwrap_or(0))
    }

    /// Time of the latest known block.
    pub fn block_time(&self) -> Option<Timestamp> {
        self.with_data(|data| data.map(|header| header.time))
    }
}

impl ObservableQueryMap<LatestBlockFetcher> {
    /// Map of latest-block queries served by `client`, using the config's
    /// stale block threshold.
    pub fn with_client(client: Arc<dyn RpcClient>, config: QueryConfig) -> Self {
        let threshold = config.stale_block_threshold;
        Self::new("latest_block", config, move |key: &QueryKey| {
            LatestBlockFetcher::new(Arc::clone(&client), key.as_str(), threshold)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::client::RpcResponse;
    use chrono::{Duration as ChronoDuration, SecondsFormat};
    use serde_json::json;

    struct BlockClient {
        body: serde_json::Value,
    }

    #[async_trait]
    impl RpcClient for BlockClient {
        fn endpoint(&self) -> &str {
            "block"
        }

        async fn query(&self, path: &str) -> Result<RpcResponse, QueryError> {
            assert_eq!(path, LatestBlockFetcher::PATH);
            Ok(RpcResponse::ok(self.body.clone()))
        }
    }

    fn block_at(field: &str, height: &str, time: Timestamp) -> serde_json::Value {
        json!({
            "block_id": {"hash": "AA"},
            field: {
                "header": {
                    "chain_id": "cosmoshub-4",
                    "height": height,
                    "time": time.to_rfc3339_opts(SecondsFormat::Nanos, true)
                }
            }
        })
    }

    fn queries(body: serde_json::Value) -> LatestBlockQueries {
        LatestBlockQueries::with_client(
            Arc::new(BlockClient { body }),
            QueryConfig::default().with_stale_block_threshold(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_is_lagging() {
        let now = Utc::now();
        let threshold = Duration::from_secs(60);
        assert!(!is_lagging(now, now, threshold));
        assert!(!is_lagging(now - ChronoDuration::seconds(59), now, threshold));
        assert!(is_lagging(now - ChronoDuration::seconds(61), now, threshold));
        assert!(!is_lagging(now + ChronoDuration::seconds(30), now, threshold));
    }

    #[tokio::test]
    async fn test_current_block() {
        let time = Utc::now();
        let queries = queries(block_at("block", "19000000", time));
        let query = queries.get("cosmoshub-4");

        query.fetch().await;

        assert_eq!(query.height(), 19_000_000);
        assert_eq!(query.block_time(), Some(time));
        assert!(!query.response().unwrap().staled);
    }

    #[tokio::test]
    async fn test_lagging_block_is_staled() {
        let time = Utc::now() - ChronoDuration::minutes(10);
        let queries = queries(block_at("sdk_block", "42", time));
        let query = queries.get("cosmoshub-4");

        query.fetch().await;

        let envelope = query.response().unwrap();
        assert!(envelope.staled);
        assert_eq!(envelope.data.height, 42);
    }

    #[tokio::test]
    async fn test_bad_height_is_decode_error() {
        let queries = queries(block_at("block", "tall", Utc::now()));
        let query = queries.get("cosmoshub-4");

        query.fetch().await;

        assert_eq!(query.height(), 0);
        assert!(query.block_time().is_none());
        assert!(matches!(query.last_error(), Some(QueryError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_missing_block_is_decode_error() {
        let queries = queries(json!({"block_id": {}}));
        let query = queries.get("cosmoshub-4");

        query.fetch().await;

        assert!(matches!(query.last_error(), Some(QueryError::Decode { .. })));
    }
}
