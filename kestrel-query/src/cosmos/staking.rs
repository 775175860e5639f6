//! Staking module delegations.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel_core::{QueryConfig, QueryError, QueryKey};
use serde::{Deserialize, Serialize};

use super::client::RpcClient;
use super::types::{parse_dec_truncated, Coin};
use crate::envelope::Fetched;
use crate::fetcher::QueryFetcher;
use crate::map::ObservableQueryMap;
use crate::query::ObservableQuery;

/// One delegation of a delegator to a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator_address: String,
    pub validator_address: String,
    /// Validator shares as an SDK decimal string.
    pub shares: String,
    /// Tokens the shares are currently worth.
    pub balance: Coin,
}

#[derive(Deserialize)]
struct DelegationsResponse {
    delegation_responses: Vec<DelegationResponse>,
}

#[derive(Deserialize)]
struct DelegationResponse {
    delegation: DelegationInfo,
    balance: Coin,
}

#[derive(Deserialize)]
struct DelegationInfo {
    delegator_address: String,
    validator_address: String,
    shares: String,
}

impl TryFrom<DelegationResponse> for Delegation {
    type Error = QueryError;

    fn try_from(raw: DelegationResponse) -> Result<Self, Self::Error> {
        raw.balance.validate()?;
        parse_dec_truncated(&raw.delegation.shares)?;
        Ok(Self {
            delegator_address: raw.delegation.delegator_address,
            validator_address: raw.delegation.validator_address,
            shares: raw.delegation.shares,
            balance: raw.balance,
        })
    }
}

/// Fetches all delegations of one delegator.
pub struct DelegationFetcher {
    client: Arc<dyn RpcClient>,
    delegator: String,
}

impl DelegationFetcher {
    pub fn new(client: Arc<dyn RpcClient>, delegator: impl Into<String>) -> Self {
        Self {
            client,
            delegator: delegator.into(),
        }
    }

    fn path(&self) -> String {
        format!("/cosmos/staking/v1beta1/delegations/{}", self.delegator)
    }
}

#[async_trait]
impl QueryFetcher for DelegationFetcher {
    type Output = Vec<Delegation>;

    async fn fetch(&self) -> Result<Fetched<Vec<Delegation>>, QueryError> {
        let response = self.client.query(&self.path()).await?;
        let status = response.status;
        let decoded: DelegationsResponse = response.decode()?;
        let delegations = decoded
            .delegation_responses
            .into_iter()
            .map(Delegation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fetched::ok(delegations).with_status(status))
    }

    fn can_fetch(&self) -> bool {
        !self.delegator.is_empty()
    }
}

pub type DelegationQuery = ObservableQuery<DelegationFetcher>;

/// Delegation queries keyed by delegator address.
pub type DelegationQueries = ObservableQueryMap<DelegationFetcher>;

impl ObservableQuery<DelegationFetcher> {
    /// All delegations; empty before the first successful fetch.
    pub fn delegations(&self) -> Vec<Delegation> {
        self.with_data(|data| data.cloned().unwrap_or_default())
    }

    /// Sum of delegated tokens in `denom`; 0 before the first fetch.
    pub fn total_delegated(&self, denom: &str) -> u128 {
        self.with_data(|data| {
            data.map(|delegations| {
                delegations
                    .iter()
                    .filter(|d| d.balance.denom == denom)
                    .map(|d| d.balance.amount_u128())
                    .fold(0u128, u128::saturating_add)
            })
            .unwrap_or(0)
        })
    }

    /// The delegation to `validator`, if there is one.
    pub fn delegation_to(&self, validator: &str) -> Option<Delegation> {
        self.with_data(|data| {
            data.and_then(|delegations| {
                delegations
                    .iter()
                    .find(|d| d.validator_address == validator)
                    .cloned()
            })
        })
    }
}

impl ObservableQueryMap<DelegationFetcher> {
    /// Map of delegation queries served by `client`.
    pub fn with_client(client: Arc<dyn RpcClient>, config: QueryConfig) -> Self {
        Self::new("delegations", config, move |key: &QueryKey| {
            DelegationFetcher::new(Arc::clone(&client), key.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::client::RpcResponse;
    use serde_json::json;

    struct StaticClient(serde_json::Value);

    #[async_trait]
    impl RpcClient for StaticClient {
        fn endpoint(&self) -> &str {
            "static"
        }

        async fn query(&self, path: &str) -> Result<RpcResponse, QueryError> {
            assert_eq!(path, "/cosmos/staking/v1beta1/delegations/cosmos1del");
            Ok(RpcResponse::ok(self.0.clone()))
        }
    }

    fn delegation(validator: &str, amount: &str) -> serde_json::Value {
        json!({
            "delegation": {
                "delegator_address": "cosmos1del",
                "validator_address": validator,
                "shares": format!("{}.000000000000000000", amount)
            },
            "balance": {"denom": "uatom", "amount": amount}
        })
    }

    #[tokio::test]
    async fn test_delegation_accessors() {
        let client = Arc::new(StaticClient(json!({
            "delegation_responses": [
                delegation("cosmosvaloper1a", "1000"),
                delegation("cosmosvaloper1b", "250")
            ]
        })));
        let queries = DelegationQueries::with_client(client, QueryConfig::default());
        let query = queries.get("cosmos1del");

        query.fetch().await;

        assert_eq!(query.delegations().len(), 2);
        assert_eq!(query.total_delegated("uatom"), 1250);
        assert_eq!(query.total_delegated("uosmo"), 0);
        let to_b = query.delegation_to("cosmosvaloper1b").unwrap();
        assert_eq!(to_b.balance.amount, "250");
        assert!(query.delegation_to("cosmosvaloper1z").is_none());
    }

    #[test]
    fn test_defaults_before_fetch() {
        let client = Arc::new(StaticClient(json!({})));
        let queries = DelegationQueries::with_client(client, QueryConfig::default());
        let query = queries.get("cosmos1del");

        assert!(query.delegations().is_empty());
        assert_eq!(query.total_delegated("uatom"), 0);
        assert!(query.delegation_to("cosmosvaloper1a").is_none());
    }

    #[tokio::test]
    async fn test_malformed_shares_rejected() {
        let client = Arc::new(StaticClient(json!({
            "delegation_responses": [{
                "delegation": {
                    "delegator_address": "cosmos1del",
                    "validator_address": "cosmosvaloper1a",
                    "shares": "many"
                },
                "balance": {"denom": "uatom", "amount": "1"}
            }]
        })));
        let queries = DelegationQueries::with_client(client, QueryConfig::default());
        let query = queries.get("cosmos1del");

        query.fetch().await;

        assert!(query.delegations().is_empty());
        assert!(matches!(query.last_error(), Some(QueryError::Decode { .. })));
    }
}
