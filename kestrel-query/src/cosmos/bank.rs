//! Bank module balances.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel_core::{QueryConfig, QueryError, QueryKey};
use serde::Deserialize;

use super::client::RpcClient;
use super::types::Coin;
use crate::envelope::Fetched;
use crate::fetcher::QueryFetcher;
use crate::map::ObservableQueryMap;
use crate::query::ObservableQuery;

/// Fetches all balances held by one address.
pub struct BalanceFetcher {
    client: Arc<dyn RpcClient>,
    address: String,
}

impl BalanceFetcher {
    pub fn new(client: Arc<dyn RpcClient>, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn path(&self) -> String {
        format!("/cosmos/bank/v1beta1/balances/{}", self.address)
    }
}

#[derive(Deserialize)]
struct BalancesResponse {
    balances: Vec<Coin>,
}

#[async_trait]
impl QueryFetcher for BalanceFetcher {
    type Output = Vec<Coin>;

    async fn fetch(&self) -> Result<Fetched<Vec<Coin>>, QueryError> {
        let response = self.client.query(&self.path()).await?;
        let status = response.status;
        let decoded: BalancesResponse = response.decode()?;
        for coin in &decoded.balances {
            coin.validate()?;
        }
        Ok(Fetched::ok(decoded.balances).with_status(status))
    }

    fn can_fetch(&self) -> bool {
        !self.address.is_empty()
    }
}

/// Balance query for one address.
pub type BalanceQuery = ObservableQuery<BalanceFetcher>;

/// Balance queries keyed by bech32 address.
pub type BalanceQueries = ObservableQueryMap<BalanceFetcher>;

impl ObservableQuery<BalanceFetcher> {
    /// All balances; empty before the first successful fetch.
    pub fn balances(&self) -> Vec<Coin> {
        self.with_data(|data| data.cloned().unwrap_or_default())
    }

    /// Balance of `denom`; zero if absent or not fetched yet.
    pub fn balance(&self, denom: &str) -> Coin {
        self.with_data(|data| {
            data.and_then(|coins| coins.iter().find(|c| c.denom == denom).cloned())
                .unwrap_or_else(|| Coin::zero(denom))
        })
    }
}

impl ObservableQueryMap<BalanceFetcher> {
    /// Map of balance queries served by `client`.
    pub fn with_client(client: Arc<dyn RpcClient>, config: QueryConfig) -> Self {
        Self::new("balances", config, move |key: &QueryKey| {
            BalanceFetcher::new(Arc::clone(&client), key.as_str())
        })
    }
}
