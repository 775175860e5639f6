//! Observable query: the fetch-and-cache unit for one key.
//!
//! # Ordering
//!
//! Every fetch gets an epoch from a per-query counter when it starts. A
//! completion is applied only if its epoch is still the latest started one,
//! so the visible envelope always comes from the most recently *initiated*
//! fetch, never from an older request that happened to finish last. There is
//! no real cancellation; superseded requests run to completion and their
//! results are dropped.
//!
//! # Coalescing
//!
//! `fetch()` while a fetch is in flight does not hit the network again. The
//! caller waits for the in-flight fetch (or whatever supersedes it) to settle.
//! `invalidate()` always starts a new epoch.
//!
//! A fetch whose future is dropped before it settles (a timeout, a lost
//! `select!` branch) releases the in-flight slot on drop, so the next
//! `fetch()` goes to the network again and coalesced waiters wake up.
//!
//! # Failure
//!
//! Nothing here returns an error to the caller of `fetch()`. Failures are
//! stored in `last_error` and the previous envelope stays readable.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kestrel_core::{now_millis, QueryError, QueryKey};
use kestrel_storage::{load_json, store_json, KvStore, ScopedKey};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::envelope::ResponseEnvelope;
use crate::fetcher::QueryFetcher;
use crate::freshness::{should_refetch, Freshness};
use crate::observer::{Observer, ObserverSet, QueryEvent, Subscription};

/// Where a query persists its envelope.
struct Persistence {
    store: Arc<dyn KvStore>,
    key: ScopedKey,
}

struct QueryState<T> {
    response: Option<ResponseEnvelope<T>>,
    last_error: Option<QueryError>,
    /// Epoch of the most recently started fetch.
    latest_epoch: u64,
    /// Epoch currently awaited, if any.
    in_flight: Option<u64>,
    /// Whether the persisted envelope has been looked up.
    hydrated: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            response: None,
            last_error: None,
            latest_epoch: 0,
            in_flight: None,
            hydrated: false,
        }
    }
}

/// Outcome of applying a completed fetch.
enum Applied<T> {
    Succeeded(ResponseEnvelope<T>),
    Failed(QueryError),
    Discarded,
}

/// Fetch lifecycle, cache and change notification for one query key.
pub struct ObservableQuery<F: QueryFetcher> {
    key: QueryKey,
    fetcher: F,
    freshness: Freshness,
    persistence: Option<Persistence>,
    state: Mutex<QueryState<F::Output>>,
    observers: ObserverSet<F::Output>,
    /// Last epoch whose result was applied.
    settled: watch::Sender<u64>,
}

impl<F: QueryFetcher> ObservableQuery<F> {
    /// Create a query with no persistence and the default freshness window.
    pub fn new(key: QueryKey, fetcher: F) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            key,
            fetcher,
            freshness: Freshness::default(),
            persistence: None,
            state: Mutex::new(QueryState::default()),
            observers: ObserverSet::default(),
            settled,
        }
    }

    /// Set the window used by [`ObservableQuery::refresh`].
    pub fn with_freshness_window(mut self, max_age: Duration) -> Self {
        self.freshness = Freshness::window(max_age);
        self
    }

    /// Persist envelopes to `store` under `key`.
    pub fn with_persistence(mut self, store: Arc<dyn KvStore>, key: ScopedKey) -> Self {
        self.persistence = Some(Persistence { store, key });
        self
    }

    /// The key this query serves.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// The fetcher behind this query.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Whether a fetch may be attempted right now.
    pub fn can_fetch(&self) -> bool {
        self.fetcher.can_fetch()
    }

    /// The current envelope, or `None` if nothing was ever fetched.
    pub fn response(&self) -> Option<ResponseEnvelope<F::Output>> {
        self.state().response.clone()
    }

    /// Run `f` against the current payload without cloning it.
    pub fn with_data<R>(&self, f: impl FnOnce(Option<&F::Output>) -> R) -> R {
        let state = self.state();
        f(state.response.as_ref().map(|e| &e.data))
    }

    /// Error of the most recent applied fetch, cleared by the next success.
    pub fn last_error(&self) -> Option<QueryError> {
        self.state().last_error.clone()
    }

    /// Whether a fetch is in flight.
    pub fn is_fetching(&self) -> bool {
        self.state().in_flight.is_some()
    }

    /// Epoch of the most recently started fetch (0 if none).
    pub fn epoch(&self) -> u64 {
        self.state().latest_epoch
    }

    /// Register an observer for every subsequent transition.
    pub fn subscribe(&self, observer: Observer<F::Output>) -> Subscription {
        self.observers.subscribe(observer)
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Fetch, coalescing with a fetch already in flight.
    pub async fn fetch(&self) {
        if !self.fetcher.can_fetch() {
            debug!(key = %self.key, "fetch skipped: precondition not met");
            return;
        }

        let begun = {
            let mut state = self.state();
            let in_flight = state.in_flight;
            match in_flight {
                Some(in_flight) => Err(in_flight),
                None => Ok(Self::begin(&mut state)),
            }
        };

        match begun {
            Ok(epoch) => self.run(epoch).await,
            Err(in_flight) => {
                debug!(key = %self.key, epoch = in_flight, "fetch coalesced");
                self.wait_settled(in_flight).await;
            }
        }
    }

    /// Start a new fetch even if one is in flight, superseding it.
    pub async fn invalidate(&self) {
        if !self.fetcher.can_fetch() {
            debug!(key = %self.key, "invalidate skipped: precondition not met");
            return;
        }

        let epoch = Self::begin(&mut self.state());
        self.run(epoch).await;
    }

    /// Fetch only if the cached envelope is outside this query's window.
    pub async fn refresh(&self) {
        self.refresh_with(self.freshness).await;
    }

    /// Fetch only if `freshness` says the cached envelope is not good enough.
    pub async fn refresh_with(&self, freshness: Freshness) {
        let needed = {
            let state = self.state();
            should_refetch(state.response.as_ref(), now_millis(), freshness)
        };
        if needed {
            self.fetch().await;
        }
    }

    fn state(&self) -> MutexGuard<'_, QueryState<F::Output>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(state: &mut QueryState<F::Output>) -> u64 {
        state.latest_epoch += 1;
        state.in_flight = Some(state.latest_epoch);
        state.latest_epoch
    }

    async fn wait_settled(&self, epoch: u64) {
        let mut settled = self.settled.subscribe();
        // The sender lives as long as `self`, so this only ends by the
        // predicate becoming true.
        let _ = settled.wait_for(|applied| *applied >= epoch).await;
    }

    /// Publish `epoch` as settled, never moving the watermark backwards.
    fn settle(&self, epoch: u64) {
        self.settled.send_if_modified(|applied| {
            if *applied < epoch {
                *applied = epoch;
                true
            } else {
                false
            }
        });
    }

    async fn run(&self, epoch: u64) {
        let mut guard = RunGuard {
            query: self,
            epoch,
            applied: false,
            settled: false,
        };

        debug!(key = %self.key, epoch, "fetch started");
        self.observers
            .notify(|| QueryEvent::FetchStarted { epoch });

        self.hydrate().await;

        let result = self.fetcher.fetch().await;

        let applied = {
            let mut state = self.state();
            if epoch != state.latest_epoch {
                Applied::Discarded
            } else {
                state.in_flight = None;
                match result {
                    Ok(fetched) => {
                        let envelope = ResponseEnvelope::from_fetched(fetched, epoch);
                        state.response = Some(envelope.clone());
                        state.last_error = None;
                        Applied::Succeeded(envelope)
                    }
                    Err(error) => {
                        state.last_error = Some(error.clone());
                        Applied::Failed(error)
                    }
                }
            }
        };

        guard.applied = !matches!(applied, Applied::Discarded);

        match applied {
            Applied::Discarded => {
                debug!(key = %self.key, epoch, "fetch result discarded: superseded");
                guard.settled = true;
                self.observers.notify(|| QueryEvent::Discarded { epoch });
                return;
            }
            Applied::Succeeded(envelope) => {
                debug!(key = %self.key, epoch, status = envelope.status, staled = envelope.staled, "fetch applied");
                self.persist(&envelope).await;
                self.observers
                    .notify(|| QueryEvent::FetchSucceeded { envelope });
            }
            Applied::Failed(error) => {
                warn!(key = %self.key, epoch, error = %error, "fetch failed");
                self.observers
                    .notify(|| QueryEvent::FetchFailed { epoch, error });
            }
        }

        guard.settled = true;
        self.settle(epoch);
    }

    /// Load the persisted envelope once, before the first network result.
    async fn hydrate(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        {
            let mut state = self.state();
            if state.hydrated || state.response.is_some() {
                state.hydrated = true;
                return;
            }
            state.hydrated = true;
        }

        let loaded =
            load_json::<ResponseEnvelope<F::Output>>(persistence.store.as_ref(), &persistence.key)
                .await;

        let restored = match loaded {
            Ok(Some(envelope)) => {
                let envelope = envelope.into_staled();
                let mut state = self.state();
                if state.response.is_some() {
                    return;
                }
                state.response = Some(envelope.clone());
                envelope
            }
            Ok(None) => return,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to restore persisted response");
                return;
            }
        };

        debug!(key = %self.key, timestamp = restored.timestamp, "restored persisted response");
        self.observers
            .notify(|| QueryEvent::Restored { envelope: restored });
    }

    /// Best-effort write of a fresh envelope.
    async fn persist(&self, envelope: &ResponseEnvelope<F::Output>) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = store_json(persistence.store.as_ref(), &persistence.key, envelope).await {
            warn!(key = %self.key, error = %e, "failed to persist response");
        }
    }
}

/// Releases the in-flight slot of a `run` that did not reach its end.
struct RunGuard<'a, F: QueryFetcher> {
    query: &'a ObservableQuery<F>,
    epoch: u64,
    /// The result was written to state; only the settle step is left.
    applied: bool,
    settled: bool,
}

impl<F: QueryFetcher> Drop for RunGuard<'_, F> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let abandoned = {
            let mut state = self.query.state();
            if state.in_flight == Some(self.epoch) {
                state.in_flight = None;
                true
            } else {
                false
            }
        };

        if abandoned {
            let epoch = self.epoch;
            debug!(key = %self.query.key, epoch, "fetch abandoned before completion");
            self.query
                .observers
                .notify(|| QueryEvent::Discarded { epoch });
        }
        if abandoned || self.applied {
            self.query.settle(self.epoch);
        }
    }
}

impl<F: QueryFetcher> std::fmt::Debug for ObservableQuery<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ObservableQuery")
            .field("key", &self.key)
            .field("epoch", &state.latest_epoch)
            .field("in_flight", &state.in_flight)
            .field("has_response", &state.response.is_some())
            .field("has_error", &state.last_error.is_some())
            .finish()
    }
}
