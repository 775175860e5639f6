//! End-to-end checks of the Cosmos query layer over a mock LCD endpoint,
//! including persistence across a simulated restart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kestrel_query::cosmos::{QueriesStore, VoteOption};
use kestrel_query::QueryEvent;
use kestrel_storage::{KvStore, LmdbKvStore};
use kestrel_test_utils::{
    assertions, fixtures, shared_client, Coin, MockRpcClient, QueryError, Tally,
};

fn mock_chain() -> (Arc<MockRpcClient>, Arc<dyn kestrel_query::RpcClient>) {
    let mock = MockRpcClient::new();
    mock.respond(
        fixtures::balances_path(fixtures::ADDRESS),
        fixtures::balances_body(&[Coin::new("uatom", 1_500_000), Coin::new("uosmo", 20)]),
    )
    .respond(
        fixtures::delegations_path(fixtures::ADDRESS),
        fixtures::delegations_body(
            fixtures::ADDRESS,
            &[(fixtures::VALIDATOR, Coin::new("uatom", 700_000))],
        ),
    )
    .respond(
        fixtures::tally_path(12),
        fixtures::tally_body(&Tally {
            yes: "750".to_string(),
            abstain: "50".to_string(),
            no: "150".to_string(),
            no_with_veto: "50".to_string(),
        }),
    )
    .respond(
        fixtures::LATEST_BLOCK_PATH,
        fixtures::latest_block_body(fixtures::CHAIN_ID, 19_250_000, Utc::now()),
    );
    shared_client(mock)
}

#[tokio::test]
async fn test_chain_queries_end_to_end() {
    let (mock, client) = mock_chain();
    let chains = QueriesStore::new(fixtures::test_config());
    let hub = chains.register(fixtures::CHAIN_ID, client);

    let balances = hub.balances().get(fixtures::ADDRESS);
    let delegations = hub.delegations().get(fixtures::ADDRESS);
    let tally = hub.tallies().get("12");
    let block = hub.latest_block();

    tokio::join!(
        balances.fetch(),
        delegations.fetch(),
        tally.fetch(),
        block.fetch()
    );

    assert_eq!(balances.balance("uatom").amount_u128(), 1_500_000);
    assert_eq!(delegations.total_delegated("uatom"), 700_000);
    assert!(delegations.delegation_to(fixtures::VALIDATOR).is_some());
    assert_eq!(tally.total_votes(), 1_000);
    assert!((tally.turnout_share(VoteOption::Yes) - 0.75).abs() < 1e-9);
    assert_eq!(block.height(), 19_250_000);
    assert!(!block.response().unwrap().staled);
    assert_eq!(mock.request_count(), 4);
}

#[tokio::test]
async fn test_transport_failure_keeps_data() {
    let (mock, client) = mock_chain();
    let chains = QueriesStore::new(fixtures::test_config());
    let hub = chains.register(fixtures::CHAIN_ID, client);
    let balances = hub.balances().get(fixtures::ADDRESS);

    balances.fetch().await;
    mock.fail(
        fixtures::balances_path(fixtures::ADDRESS),
        QueryError::transport("mock://lcd", "connection reset"),
    );
    balances.invalidate().await;

    assertions::assert_transport_error(&balances);
    assert_eq!(balances.balance("uatom").amount_u128(), 1_500_000);
}

#[tokio::test]
async fn test_refresh_respects_window() {
    let (mock, client) = mock_chain();
    let chains = QueriesStore::new(
        fixtures::test_config().with_freshness_window(Duration::from_secs(3600)),
    );
    let hub = chains.register(fixtures::CHAIN_ID, client);
    let balances = hub.balances().get(fixtures::ADDRESS);

    balances.refresh().await;
    balances.refresh().await;
    assert_eq!(mock.request_count(), 1);

    balances.invalidate().await;
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test]
async fn test_restored_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let kv: Arc<dyn KvStore> = Arc::new(LmdbKvStore::new(dir.path(), 16).unwrap());
        let (_, client) = mock_chain();
        let chains = QueriesStore::new(fixtures::test_config()).with_store(kv);
        let hub = chains.register(fixtures::CHAIN_ID, client);
        hub.balances().get(fixtures::ADDRESS).fetch().await;
    }

    let kv: Arc<dyn KvStore> = Arc::new(LmdbKvStore::new(dir.path(), 16).unwrap());
    // The endpoint is down after the restart.
    let (mock, client) = shared_client(MockRpcClient::new());
    let chains = QueriesStore::new(fixtures::test_config()).with_store(kv);
    let hub = chains.register(fixtures::CHAIN_ID, client);
    let balances = hub.balances().get(fixtures::ADDRESS);

    let restored = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&restored);
    balances.subscribe(Arc::new(move |event: &QueryEvent<Vec<Coin>>| {
        if matches!(event, QueryEvent::Restored { .. }) {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }));

    balances.fetch().await;

    assert!(restored.load(std::sync::atomic::Ordering::SeqCst));
    let envelope = balances.response().unwrap();
    assert!(envelope.staled);
    assert_eq!(balances.balance("uatom").amount_u128(), 1_500_000);
    assert!(balances.last_error().is_some());
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_chains_do_not_share_state() {
    let (_, hub_client) = mock_chain();
    let (_, empty_client) = shared_client(MockRpcClient::new());
    let chains = QueriesStore::new(fixtures::test_config());

    let hub = chains.register(fixtures::CHAIN_ID, hub_client);
    let other = chains.get_or_register("osmosis-1", || empty_client);

    hub.balances().get(fixtures::ADDRESS).fetch().await;
    other.balances().get(fixtures::ADDRESS).fetch().await;

    assert_eq!(
        hub.balances().get(fixtures::ADDRESS).balances().len(),
        2
    );
    let other_query = other.balances().get(fixtures::ADDRESS);
    assert!(other_query.balances().is_empty());
    assert!(matches!(
        other_query.last_error(),
        Some(QueryError::Status { status: 404, .. })
    ));
}
