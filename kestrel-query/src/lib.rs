//! Kestrel Query - Observable Query Cache
//!
//! A reactive cache of read-only blockchain queries. Each [`ObservableQuery`]
//! owns the fetch lifecycle of one key: it issues requests through a
//! [`QueryFetcher`], keeps the latest [`ResponseEnvelope`] readable while a
//! refetch is in flight, records the last error without dropping good data,
//! and notifies observers of every transition. [`ObservableQueryMap`] hands
//! out one shared instance per key.
//!
//! ```ignore
//! let client = Arc::new(LcdClient::with_default_timeout("https://lcd.example")?);
//! let chains = QueriesStore::new(QueryConfig::from_env());
//! let hub = chains.register("cosmoshub-4", client);
//!
//! let balance = hub.balances().get("cosmos1...");
//! balance.fetch().await;
//! println!("{}", balance.balance("uatom"));
//! ```

pub mod cosmos;
pub mod envelope;
pub mod fetcher;
pub mod freshness;
pub mod map;
pub mod observer;
pub mod query;

pub use envelope::{Fetched, ResponseEnvelope};
pub use fetcher::QueryFetcher;
pub use freshness::{should_refetch, Freshness};
pub use map::{FetcherFactory, ObservableQueryMap};
pub use observer::{Observer, QueryEvent, Subscription};
pub use query::ObservableQuery;

pub use cosmos::{
    Coin, CosmosQueries, LcdClient, QueriesStore, RpcClient, RpcResponse,
};
pub use kestrel_core::{QueryConfig, QueryError, QueryKey};
