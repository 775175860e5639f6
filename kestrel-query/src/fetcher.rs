//! The fetch capability plugged into an observable query.

use async_trait::async_trait;
use kestrel_core::QueryError;
use serde::{de::DeserializeOwned, Serialize};

use crate::envelope::Fetched;

/// Fetches and decodes one query target.
///
/// Each query type supplies one of these. The fetcher owns whatever
/// parameters identify the target (address, proposal id, ...), so `fetch`
/// takes no arguments.
///
/// # Implementation Requirements
///
/// - Transport and decode failures are returned as [`QueryError`]; the query
///   records them and keeps its last good envelope.
/// - `can_fetch` must be cheap and side-effect free. Returning false turns
///   `fetch()` on the query into a no-op without recording an error.
#[async_trait]
pub trait QueryFetcher: Send + Sync + 'static {
    /// Decoded payload stored in the envelope.
    type Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Issue the request and decode the response.
    async fn fetch(&self) -> Result<Fetched<Self::Output>, QueryError>;

    /// Whether a fetch should be attempted at all.
    fn can_fetch(&self) -> bool {
        true
    }
}
