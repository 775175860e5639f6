//! Cosmos SDK query extensions.
//!
//! Each extension is a [`QueryFetcher`](crate::QueryFetcher) that requests one
//! LCD path through an [`RpcClient`] and decodes it into typed data, plus
//! accessors on the resulting query that return an empty or zero default
//! until the first successful fetch. [`CosmosQueries`] groups the maps of one
//! chain and [`QueriesStore`] holds one group per chain id.

pub mod bank;
pub mod block;
pub mod client;
pub mod gov;
pub mod queries;
pub mod staking;
pub mod types;

pub use bank::{BalanceFetcher, BalanceQueries, BalanceQuery};
pub use block::{BlockHeader, LatestBlockFetcher, LatestBlockQueries, LatestBlockQuery};
pub use client::{LcdClient, RpcClient, RpcResponse};
pub use gov::{Tally, TallyFetcher, TallyQueries, TallyQuery, VoteOption};
pub use queries::{CosmosQueries, QueriesStore};
pub use staking::{Delegation, DelegationFetcher, DelegationQueries, DelegationQuery};
pub use types::Coin;
