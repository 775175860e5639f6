//! Kestrel Test Utilities
//!
//! Shared test infrastructure for the Kestrel workspace:
//! - Scripted fetchers and a mock RPC client
//! - Proptest generators for keys, coins and tallies
//! - JSON fixtures shaped like Cosmos SDK LCD responses
//! - Assertions over query state

pub use kestrel_core::{KestrelError, KestrelResult, QueryConfig, QueryError, QueryKey};
pub use kestrel_query::cosmos::{Coin, RpcClient, RpcResponse, Tally};
pub use kestrel_query::{Fetched, ObservableQuery, QueryFetcher, ResponseEnvelope};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

// ============================================================================
// MOCK FETCHERS
// ============================================================================

/// One step of a [`ScriptedFetcher`].
#[derive(Debug, Clone)]
pub struct Step {
    pub reply: Result<Value, QueryError>,
    pub delay: Duration,
}

/// Fetcher that plays back a fixed script of replies.
///
/// The n-th call gets the n-th step. Past the end, a cycling script wraps
/// around and a plain one fails with a decode error. Each step may sleep
/// before replying, which is how tests make an older request finish last.
#[derive(Debug)]
pub struct ScriptedFetcher {
    steps: Vec<Step>,
    cycle: bool,
    calls: AtomicUsize,
    enabled: AtomicBool,
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cycle: false,
            calls: AtomicUsize::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Next call succeeds with `value`.
    pub fn then_ok(self, value: Value) -> Self {
        self.then_ok_after(Duration::ZERO, value)
    }

    /// Next call succeeds with `value` after `delay`.
    pub fn then_ok_after(mut self, delay: Duration, value: Value) -> Self {
        self.steps.push(Step {
            reply: Ok(value),
            delay,
        });
        self
    }

    /// Next call fails with `error`.
    pub fn then_err(self, error: QueryError) -> Self {
        self.then_err_after(Duration::ZERO, error)
    }

    /// Next call fails with `error` after `delay`.
    pub fn then_err_after(mut self, delay: Duration, error: QueryError) -> Self {
        self.steps.push(Step {
            reply: Err(error),
            delay,
        });
        self
    }

    /// Wrap around once the script is exhausted.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Start with `can_fetch` false.
    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::SeqCst);
        self
    }

    /// Succeeds with `{"balance": "100"}` after `delay`, on every call.
    pub fn delayed_balance(delay: Duration) -> Self {
        Self::new()
            .then_ok_after(delay, fixtures::balance_value("100"))
            .cycling()
    }

    /// Success with `value` and failure with `error`, alternating,
    /// starting with the success.
    pub fn alternating(value: Value, error: QueryError) -> Self {
        Self::new().then_ok(value).then_err(error).cycling()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Number of times `fetch` was called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn step(&self, call: usize) -> Option<&Step> {
        if self.steps.is_empty() {
            return None;
        }
        match self.steps.get(call) {
            Some(step) => Some(step),
            None if self.cycle => self.steps.get(call % self.steps.len()),
            None => None,
        }
    }
}

#[async_trait]
impl QueryFetcher for ScriptedFetcher {
    type Output = Value;

    async fn fetch(&self) -> Result<Fetched<Value>, QueryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.step(call).cloned() else {
            return Err(QueryError::decode(format!("script exhausted at call {}", call)));
        };
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.reply.map(Fetched::ok)
    }

    fn can_fetch(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Build a standalone query over a scripted fetcher.
pub fn scripted_query(key: &str, fetcher: ScriptedFetcher) -> ObservableQuery<ScriptedFetcher> {
    ObservableQuery::new(QueryKey::new(key), fetcher)
}

// ============================================================================
// MOCK RPC CLIENT
// ============================================================================

/// RPC client answering from a path table. Unknown paths get a 404.
#[derive(Debug, Default)]
pub struct MockRpcClient {
    routes: Mutex<HashMap<String, Result<RpcResponse, QueryError>>>,
    requests: Mutex<Vec<String>>,
    delay: Duration,
}

impl MockRpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer `path` with a 200 and `body`.
    pub fn respond(&self, path: impl Into<String>, body: Value) -> &Self {
        self.routes()
            .insert(path.into(), Ok(RpcResponse::ok(body)));
        self
    }

    /// Answer `path` with `error`.
    pub fn fail(&self, path: impl Into<String>, error: QueryError) -> &Self {
        self.routes().insert(path.into(), Err(error));
        self
    }

    /// Paths requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Result<RpcResponse, QueryError>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RpcClient for MockRpcClient {
    fn endpoint(&self) -> &str {
        "mock://lcd"
    }

    async fn query(&self, path: &str) -> Result<RpcResponse, QueryError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.routes().get(path).cloned();
        reply.unwrap_or_else(|| {
            Err(QueryError::Status {
                endpoint: format!("mock://lcd{}", path),
                status: 404,
                message: "no route".to_string(),
            })
        })
    }
}

/// A mock client behind the trait object the query maps take.
pub fn shared_client(client: MockRpcClient) -> (Arc<MockRpcClient>, Arc<dyn RpcClient>) {
    let client = Arc::new(client);
    let shared: Arc<dyn RpcClient> = client.clone();
    (client, shared)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Kestrel value types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a bech32-looking account address.
    pub fn arb_address() -> impl Strategy<Value = String> {
        "[a-z]{2,8}1[02-9ac-hj-np-z]{38}"
    }

    /// Generate a non-empty query key.
    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        "[a-zA-Z0-9_./-]{1,48}".prop_map(QueryKey::new)
    }

    /// Generate a denomination.
    pub fn arb_denom() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("uatom".to_string()),
            Just("uosmo".to_string()),
            "[a-z]{3,10}",
            "ibc/[0-9A-F]{64}",
        ]
    }

    pub fn arb_coin() -> impl Strategy<Value = Coin> {
        (arb_denom(), any::<u64>()).prop_map(|(denom, amount)| Coin::new(denom, amount as u128))
    }

    /// Coins with distinct denominations.
    pub fn arb_coins() -> impl Strategy<Value = Vec<Coin>> {
        prop::collection::btree_map(arb_denom(), any::<u64>(), 0..6).prop_map(|coins| {
            coins
                .into_iter()
                .map(|(denom, amount)| Coin::new(denom, amount as u128))
                .collect()
        })
    }

    pub fn arb_tally() -> impl Strategy<Value = Tally> {
        (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
            |(yes, abstain, no, no_with_veto)| Tally {
                yes: yes.to_string(),
                abstain: abstain.to_string(),
                no: no.to_string(),
                no_with_veto: no_with_veto.to_string(),
            },
        )
    }

    /// Generate a config that passes `validate()`.
    pub fn arb_valid_config() -> impl Strategy<Value = QueryConfig> {
        (
            0u64..600_000,
            1usize..2048,
            any::<bool>(),
            1u64..3_600_000,
            "[a-z][a-z0-9_.-]{0,15}",
        )
            .prop_map(|(window, max, persist, threshold, namespace)| {
                QueryConfig::default()
                    .with_freshness_window(Duration::from_millis(window))
                    .with_max_cached_queries(max)
                    .with_persistence(persist)
                    .with_stale_block_threshold(Duration::from_millis(threshold))
                    .with_namespace(namespace)
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! JSON bodies shaped like Cosmos SDK LCD responses.

    use super::*;
    use chrono::SecondsFormat;
    use kestrel_core::Timestamp;
    use serde_json::json;

    pub const ADDRESS: &str = "cosmos1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu";
    pub const VALIDATOR: &str = "cosmosvaloper1sjllsnramtg3ewxqwwrwjxfgc4n4ef9u2lcnj0";
    pub const CHAIN_ID: &str = "cosmoshub-4";

    pub fn balances_path(address: &str) -> String {
        format!("/cosmos/bank/v1beta1/balances/{}", address)
    }

    pub fn delegations_path(delegator: &str) -> String {
        format!("/cosmos/staking/v1beta1/delegations/{}", delegator)
    }

    pub fn tally_path(proposal_id: u64) -> String {
        format!("/cosmos/gov/v1beta1/proposals/{}/tally", proposal_id)
    }

    pub const LATEST_BLOCK_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks/latest";

    /// `{"balance": amount}`, the payload the scripted fetchers use.
    pub fn balance_value(amount: &str) -> Value {
        json!({ "balance": amount })
    }

    pub fn balances_body(coins: &[Coin]) -> Value {
        json!({
            "balances": coins,
            "pagination": { "next_key": null, "total": coins.len().to_string() }
        })
    }

    pub fn delegations_body(delegator: &str, entries: &[(&str, Coin)]) -> Value {
        let responses: Vec<Value> = entries
            .iter()
            .map(|(validator, coin)| {
                json!({
                    "delegation": {
                        "delegator_address": delegator,
                        "validator_address": validator,
                        "shares": format!("{}.000000000000000000", coin.amount)
                    },
                    "balance": coin
                })
            })
            .collect();
        json!({ "delegation_responses": responses })
    }

    pub fn tally_body(tally: &Tally) -> Value {
        json!({ "tally": tally })
    }

    pub fn latest_block_body(chain_id: &str, height: u64, time: Timestamp) -> Value {
        json!({
            "block_id": { "hash": "3A1F" },
            "block": {
                "header": {
                    "chain_id": chain_id,
                    "height": height.to_string(),
                    "time": time.to_rfc3339_opts(SecondsFormat::Nanos, true)
                }
            }
        })
    }

    /// Config with a short window and small registry, persistence on.
    pub fn test_config() -> QueryConfig {
        QueryConfig::default()
            .with_freshness_window(Duration::from_millis(50))
            .with_max_cached_queries(8)
            .with_namespace("kestrel-test")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over query state.

    use super::*;

    /// Assert the query holds an envelope whose payload equals `expected`.
    #[track_caller]
    pub fn assert_data<F>(query: &ObservableQuery<F>, expected: &F::Output)
    where
        F: QueryFetcher,
        F::Output: PartialEq + std::fmt::Debug,
    {
        match query.response() {
            Some(envelope) => assert_eq!(&envelope.data, expected, "unexpected payload"),
            None => panic!("Expected a response, got none"),
        }
    }

    /// Assert nothing was ever fetched.
    #[track_caller]
    pub fn assert_untouched<F: QueryFetcher>(query: &ObservableQuery<F>) {
        assert!(query.response().is_none(), "Expected no response");
        assert!(query.last_error().is_none(), "Expected no error");
        assert_eq!(query.epoch(), 0, "Expected no fetch to have started");
        assert!(!query.is_fetching(), "Expected no fetch in flight");
    }

    /// Assert the last error is a transport or status failure.
    #[track_caller]
    pub fn assert_transport_error<F: QueryFetcher>(query: &ObservableQuery<F>) {
        match query.last_error() {
            Some(err) if err.is_transport() => {}
            other => panic!("Expected transport error, got: {:?}", other),
        }
    }

    /// Assert the last error is a decode failure.
    #[track_caller]
    pub fn assert_decode_error<F: QueryFetcher>(query: &ObservableQuery<F>) {
        match query.last_error() {
            Some(QueryError::Decode { .. }) => {}
            other => panic!("Expected decode error, got: {:?}", other),
        }
    }

    /// Assert a config passes validation.
    #[track_caller]
    pub fn assert_config_valid(config: &QueryConfig) {
        if let Err(e) = config.validate() {
            panic!("Expected valid config, got: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
