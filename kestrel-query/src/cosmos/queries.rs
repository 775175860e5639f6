//! Per-chain query sets and the registry that owns them.

use std::sync::Arc;

use dashmap::DashMap;
use kestrel_core::QueryConfig;
use kestrel_storage::KvStore;
use tracing::debug;

use super::bank::BalanceQueries;
use super::block::{LatestBlockQueries, LatestBlockQuery};
use super::client::RpcClient;
use super::gov::TallyQueries;
use super::staking::DelegationQueries;

/// All query maps of one chain, sharing one client and one store namespace.
pub struct CosmosQueries {
    chain_id: String,
    client: Arc<dyn RpcClient>,
    balances: BalanceQueries,
    delegations: DelegationQueries,
    tallies: TallyQueries,
    blocks: LatestBlockQueries,
}

impl CosmosQueries {
    /// Build the query set for `chain_id`.
    ///
    /// Persisted entries land under the namespace `"{config.namespace}.{chain_id}"`
    /// so chains sharing a store never read each other's envelopes.
    pub fn new(
        chain_id: impl Into<String>,
        client: Arc<dyn RpcClient>,
        config: QueryConfig,
        store: Option<Arc<dyn KvStore>>,
    ) -> Self {
        let chain_id = chain_id.into();
        let namespace = chain_namespace(&config.namespace, &chain_id);
        let config = config.with_namespace(namespace);

        let balances = BalanceQueries::with_client(Arc::clone(&client), config.clone());
        let delegations = DelegationQueries::with_client(Arc::clone(&client), config.clone());
        let tallies = TallyQueries::with_client(Arc::clone(&client), config.clone());
        let blocks = LatestBlockQueries::with_client(Arc::clone(&client), config);

        let (balances, delegations, tallies, blocks) = match store {
            Some(store) => (
                balances.with_store(Arc::clone(&store)),
                delegations.with_store(Arc::clone(&store)),
                tallies.with_store(Arc::clone(&store)),
                blocks.with_store(store),
            ),
            None => (balances, delegations, tallies, blocks),
        };

        Self {
            chain_id,
            client,
            balances,
            delegations,
            tallies,
            blocks,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn client(&self) -> &Arc<dyn RpcClient> {
        &self.client
    }

    pub fn balances(&self) -> &BalanceQueries {
        &self.balances
    }

    pub fn delegations(&self) -> &DelegationQueries {
        &self.delegations
    }

    pub fn tallies(&self) -> &TallyQueries {
        &self.tallies
    }

    pub fn blocks(&self) -> &LatestBlockQueries {
        &self.blocks
    }

    /// The latest-block query of this chain.
    pub fn latest_block(&self) -> Arc<LatestBlockQuery> {
        self.blocks.get(self.chain_id.as_str())
    }
}

impl std::fmt::Debug for CosmosQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosQueries")
            .field("chain_id", &self.chain_id)
            .field("endpoint", &self.client.endpoint())
            .field("balances", &self.balances.len())
            .field("delegations", &self.delegations.len())
            .field("tallies", &self.tallies.len())
            .finish()
    }
}

/// Store namespace for one chain. '/' is the scoped key separator, so it is
/// replaced.
fn chain_namespace(base: &str, chain_id: &str) -> String {
    format!("{}.{}", base, chain_id.replace('/', "_"))
}

/// Registry of per-chain query sets.
///
/// Constructed explicitly and passed around; there is no global instance.
pub struct QueriesStore {
    config: QueryConfig,
    store: Option<Arc<dyn KvStore>>,
    chains: DashMap<String, Arc<CosmosQueries>>,
}

impl QueriesStore {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            config,
            store: None,
            chains: DashMap::new(),
        }
    }

    /// Persist envelopes of chains registered from now on to `store`.
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Register `chain_id` served by `client`, replacing any existing entry.
    pub fn register(
        &self,
        chain_id: impl Into<String>,
        client: Arc<dyn RpcClient>,
    ) -> Arc<CosmosQueries> {
        let chain_id = chain_id.into();
        let queries = Arc::new(self.build(&chain_id, client));
        if self
            .chains
            .insert(chain_id.clone(), Arc::clone(&queries))
            .is_some()
        {
            debug!(chain_id = %chain_id, "replaced chain queries");
        }
        queries
    }

    /// Get the queries of `chain_id`, registering them with the client from
    /// `make_client` if absent. `make_client` runs at most once per call and
    /// only when the chain is new.
    pub fn get_or_register(
        &self,
        chain_id: &str,
        make_client: impl FnOnce() -> Arc<dyn RpcClient>,
    ) -> Arc<CosmosQueries> {
        let entry = self
            .chains
            .entry(chain_id.to_string())
            .or_insert_with(|| {
                debug!(chain_id = %chain_id, "registering chain queries");
                Arc::new(self.build(chain_id, make_client()))
            });
        Arc::clone(entry.value())
    }

    pub fn get(&self, chain_id: &str) -> Option<Arc<CosmosQueries>> {
        self.chains.get(chain_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn has(&self, chain_id: &str) -> bool {
        self.chains.contains_key(chain_id)
    }

    pub fn remove(&self, chain_id: &str) -> Option<Arc<CosmosQueries>> {
        self.chains.remove(chain_id).map(|(_, queries)| queries)
    }

    pub fn clear(&self) {
        self.chains.clear();
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chain_ids(&self) -> Vec<String> {
        self.chains.iter().map(|entry| entry.key().clone()).collect()
    }

    fn build(&self, chain_id: &str, client: Arc<dyn RpcClient>) -> CosmosQueries {
        CosmosQueries::new(chain_id, client, self.config.clone(), self.store.clone())
    }
}

impl std::fmt::Debug for QueriesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueriesStore")
            .field("chains", &self.chain_ids())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::client::RpcResponse;
    use async_trait::async_trait;
    use kestrel_core::QueryError;
    use kestrel_storage::InMemoryKvStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BankClient {
        endpoint: String,
    }

    #[async_trait]
    impl RpcClient for BankClient {
        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn query(&self, _path: &str) -> Result<RpcResponse, QueryError> {
            Ok(RpcResponse::ok(json!({
                "balances": [{"denom": "uatom", "amount": "100"}]
            })))
        }
    }

    fn client(endpoint: &str) -> Arc<dyn RpcClient> {
        Arc::new(BankClient {
            endpoint: endpoint.to_string(),
        })
    }

    #[test]
    fn test_chain_namespace() {
        assert_eq!(chain_namespace("kestrel", "cosmoshub-4"), "kestrel.cosmoshub-4");
        assert_eq!(chain_namespace("kestrel", "a/b"), "kestrel.a_b");
    }

    #[test]
    fn test_register_and_lookup() {
        let store = QueriesStore::new(QueryConfig::default());
        assert!(!store.has("cosmoshub-4"));
        assert!(store.get("cosmoshub-4").is_none());

        let registered = store.register("cosmoshub-4", client("lcd-a"));
        assert!(store.has("cosmoshub-4"));
        let fetched = store.get("cosmoshub-4").unwrap();
        assert!(Arc::ptr_eq(&registered, &fetched));
        assert_eq!(fetched.chain_id(), "cosmoshub-4");
        assert_eq!(fetched.client().endpoint(), "lcd-a");
    }

    #[test]
    fn test_get_or_register_builds_once() {
        let store = QueriesStore::new(QueryConfig::default());
        let built = AtomicUsize::new(0);

        let first = store.get_or_register("osmosis-1", || {
            built.fetch_add(1, Ordering::SeqCst);
            client("lcd-o")
        });
        let second = store.get_or_register("osmosis-1", || {
            built.fetch_add(1, Ordering::SeqCst);
            client("lcd-o")
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = QueriesStore::new(QueryConfig::default());
        store.register("a-1", client("a"));
        store.register("b-1", client("b"));

        assert!(store.remove("a-1").is_some());
        assert!(store.remove("a-1").is_none());
        assert_eq!(store.chain_ids(), vec!["b-1".to_string()]);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_latest_block_is_shared() {
        let queries = CosmosQueries::new("cosmoshub-4", client("x"), QueryConfig::default(), None);
        let a = queries.latest_block();
        let b = queries.latest_block();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.key().as_str(), "cosmoshub-4");
    }

    #[tokio::test]
    async fn test_chains_persist_separately() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = QueriesStore::new(QueryConfig::default()).with_store(kv.clone());

        let hub = store.register("cosmoshub-4", client("hub"));
        let osmo = store.register("osmosis-1", client("osmo"));
        hub.balances().get("addr").fetch().await;
        osmo.balances().get("addr").fetch().await;

        assert!(kv
            .get("kestrel.cosmoshub-4/balances/addr")
            .await
            .unwrap()
            .is_some());
        assert!(kv
            .get("kestrel.osmosis-1/balances/addr")
            .await
            .unwrap()
            .is_some());
        assert_eq!(kv.len().await, 2);
    }
}
