//! Governance proposal tallies.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel_core::{QueryConfig, QueryError, QueryKey};
use serde::{Deserialize, Serialize};

use super::client::RpcClient;
use super::types::parse_dec_truncated;
use crate::envelope::Fetched;
use crate::fetcher::QueryFetcher;
use crate::map::ObservableQueryMap;
use crate::query::ObservableQuery;

/// A vote option on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteOption {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

/// Vote totals of one proposal, in voting power.
///
/// Accepts both the v1beta1 field names and the v1 `*_count` names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    #[serde(alias = "yes_count")]
    pub yes: String,
    #[serde(alias = "abstain_count")]
    pub abstain: String,
    #[serde(alias = "no_count")]
    pub no: String,
    #[serde(alias = "no_with_veto_count")]
    pub no_with_veto: String,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            yes: "0".to_string(),
            abstain: "0".to_string(),
            no: "0".to_string(),
            no_with_veto: "0".to_string(),
        }
    }
}

impl Tally {
    /// Votes cast for `option`; 0 if the stored value does not parse.
    pub fn votes(&self, option: VoteOption) -> u128 {
        let raw = match option {
            VoteOption::Yes => &self.yes,
            VoteOption::Abstain => &self.abstain,
            VoteOption::No => &self.no,
            VoteOption::NoWithVeto => &self.no_with_veto,
        };
        parse_dec_truncated(raw).unwrap_or(0)
    }

    pub fn total(&self) -> u128 {
        [
            VoteOption::Yes,
            VoteOption::Abstain,
            VoteOption::No,
            VoteOption::NoWithVeto,
        ]
        .into_iter()
        .map(|option| self.votes(option))
        .fold(0u128, u128::saturating_add)
    }

    fn validate(&self) -> Result<(), QueryError> {
        for raw in [&self.yes, &self.abstain, &self.no, &self.no_with_veto] {
            parse_dec_truncated(raw)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct TallyResponse {
    tally: Tally,
}

/// Fetches the current tally of one proposal.
pub struct TallyFetcher {
    client: Arc<dyn RpcClient>,
    proposal_id: u64,
}

impl TallyFetcher {
    pub fn new(client: Arc<dyn RpcClient>, proposal_id: u64) -> Self {
        Self {
            client,
            proposal_id,
        }
    }

    /// Build from a query key; a key that is not a proposal id maps to 0,
    /// which never fetches.
    pub fn from_key(client: Arc<dyn RpcClient>, key: &QueryKey) -> Self {
        Self::new(client, key.as_str().parse().unwrap_or(0))
    }

    pub fn proposal_id(&self) -> u64 {
        self.proposal_id
    }

    fn path(&self) -> String {
        format!("/cosmos/gov/v1beta1/proposals/{}/tally", self.proposal_id)
    }
}

#[async_trait]
impl QueryFetcher for TallyFetcher {
    type Output = Tally;

    async fn fetch(&self) -> Result<Fetched<Tally>, QueryError> {
        let response = self.client.query(&self.path()).await?;
        let status = response.status;
        let decoded: TallyResponse = response.decode()?;
        decoded.tally.validate()?;
        Ok(Fetched::ok(decoded.tally).with_status(status))
    }

    /// Proposal ids start at 1.
    fn can_fetch(&self) -> bool {
        self.proposal_id > 0
    }
}

pub type TallyQuery = ObservableQuery<TallyFetcher>;

/// Tally queries keyed by proposal id.
pub type TallyQueries = ObservableQueryMap<TallyFetcher>;

impl ObservableQuery<TallyFetcher> {
    /// The tally; all zeros before the first successful fetch.
    pub fn tally(&self) -> Tally {
        self.with_data(|data| data.cloned().unwrap_or_default())
    }

    pub fn total_votes(&self) -> u128 {
        self.with_data(|data| data.map(Tally::total).unwrap_or(0))
    }

    /// Fraction of cast votes that went to `option`, in `[0, 1]`. 0 when
    /// nothing was cast.
    pub fn turnout_share(&self, option: VoteOption) -> f64 {
        self.with_data(|data| {
            let Some(tally) = data else {
                return 0.0;
            };
            let total = tally.total();
            if total == 0 {
                return 0.0;
            }
            tally.votes(option) as f64 / total as f64
        })
    }
}

impl ObservableQueryMap<TallyFetcher> {
    /// Map of tally queries served by `client`.
    pub fn with_client(client: Arc<dyn RpcClient>, config: QueryConfig) -> Self {
        Self::new("tally", config, move |key: &QueryKey| {
            TallyFetcher::from_key(Arc::clone(&client), key)
        })
    }

    /// The query for proposal `id`, under its canonical key. Prefer this over
    /// `get` with a hand-formatted id, since `"07"` and `"7"` are different
    /// keys.
    pub fn proposal(&self, id: u64) -> Arc<TallyQuery> {
        self.get(id.to_string())
    }
}
