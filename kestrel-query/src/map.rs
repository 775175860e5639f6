//! Keyed registry of observable queries.
//!
//! Two consumers asking for the same key share one instance, so they share
//! one cache entry and one in-flight request. The registry is bounded: once
//! it holds `max_cached_queries` instances, inserting a new key drops the
//! least recently used instance that nobody else holds and that has no fetch
//! in flight. Evicting anything else would let the next `get` build a second
//! live instance for the key, so when every entry is held or busy the map
//! grows past the bound instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kestrel_core::{QueryConfig, QueryKey};
use kestrel_storage::{KvStore, ScopedKey};
use tracing::{debug, warn};

use crate::fetcher::QueryFetcher;
use crate::query::ObservableQuery;

/// Builds the fetcher for a key on first access.
pub type FetcherFactory<F> = Box<dyn Fn(&QueryKey) -> F + Send + Sync>;

struct Slot<F: QueryFetcher> {
    query: Arc<ObservableQuery<F>>,
    last_access: u64,
}

struct Entries<F: QueryFetcher> {
    queries: HashMap<QueryKey, Slot<F>>,
    tick: u64,
}

/// Get-or-create registry with at most one query per key.
pub struct ObservableQueryMap<F: QueryFetcher> {
    kind: String,
    factory: FetcherFactory<F>,
    store: Option<Arc<dyn KvStore>>,
    config: QueryConfig,
    entries: Mutex<Entries<F>>,
}

impl<F: QueryFetcher> ObservableQueryMap<F> {
    /// Create a map.
    ///
    /// `kind` names the query type (e.g. `"balances"`) and separates its
    /// persisted entries from other maps sharing the same store and
    /// namespace. '/' separates kind from key in persisted keys, so any '/'
    /// in `kind` is replaced with '_'.
    pub fn new(
        kind: impl Into<String>,
        config: QueryConfig,
        factory: impl Fn(&QueryKey) -> F + Send + Sync + 'static,
    ) -> Self {
        let kind = kind.into();
        let kind = if kind.contains('/') {
            warn!(kind = %kind, "query kind contains '/', replacing with '_'");
            kind.replace('/', "_")
        } else {
            kind
        };
        Self {
            kind,
            factory: Box::new(factory),
            store: None,
            config,
            entries: Mutex::new(Entries {
                queries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Attach a shared store for persisting envelopes.
    ///
    /// Only queries created after this call persist. Has no effect when
    /// `persist_responses` is off in the config.
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The query type label.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The config new queries are built with.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Get the query for `key`, creating it on first access.
    pub fn get(&self, key: impl Into<QueryKey>) -> Arc<ObservableQuery<F>> {
        let key = key.into();
        let mut entries = self.entries();
        entries.tick += 1;
        let tick = entries.tick;

        if let Some(slot) = entries.queries.get_mut(&key) {
            slot.last_access = tick;
            return Arc::clone(&slot.query);
        }

        let bound = self.config.max_cached_queries.max(1);
        while entries.queries.len() >= bound {
            if !Self::evict_lru(&mut entries) {
                debug!(len = entries.queries.len(), bound, "every query in use, growing past bound");
                break;
            }
        }

        let query = Arc::new(self.build(key.clone()));
        entries.queries.insert(
            key,
            Slot {
                query: Arc::clone(&query),
                last_access: tick,
            },
        );
        query
    }

    /// Whether a query for `key` is registered. Never creates one.
    pub fn has(&self, key: impl Into<QueryKey>) -> bool {
        self.entries().queries.contains_key(&key.into())
    }

    /// Number of registered queries.
    pub fn len(&self) -> usize {
        self.entries().queries.len()
    }

    /// Whether the map holds no queries.
    pub fn is_empty(&self) -> bool {
        self.entries().queries.is_empty()
    }

    /// Registered keys, in no particular order.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries().queries.keys().cloned().collect()
    }

    /// Drop the registry's reference to `key`. Returns whether it was present.
    pub fn evict(&self, key: impl Into<QueryKey>) -> bool {
        self.entries().queries.remove(&key.into()).is_some()
    }

    /// Drop every registered query.
    pub fn clear(&self) {
        self.entries().queries.clear();
    }

    fn entries(&self) -> MutexGuard<'_, Entries<F>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build(&self, key: QueryKey) -> ObservableQuery<F> {
        let fetcher = (self.factory)(&key);
        let query = ObservableQuery::new(key.clone(), fetcher)
            .with_freshness_window(self.config.freshness_window);

        let Some(store) = self.store.as_ref().filter(|_| self.config.persist_responses) else {
            return query;
        };

        let scoped = QueryKey::new(format!("{}/{}", self.kind, key));
        match ScopedKey::new(self.config.namespace.clone(), scoped) {
            Some(scoped) => query.with_persistence(Arc::clone(store), scoped),
            None => {
                warn!(
                    namespace = %self.config.namespace,
                    "invalid cache namespace, persistence disabled"
                );
                query
            }
        }
    }

    /// Remove the least recently used entry that is unreferenced and idle.
    /// Returns whether one was removed.
    fn evict_lru(entries: &mut Entries<F>) -> bool {
        let victim = entries
            .queries
            .iter()
            .filter(|(_, slot)| Arc::strong_count(&slot.query) == 1 && !slot.query.is_fetching())
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(key, _)| key.clone());

        match victim {
            Some(key) => {
                debug!(key = %key, "evicting least recently used query");
                entries.queries.remove(&key);
                true
            }
            None => false,
        }
    }
}

impl<F: QueryFetcher> std::fmt::Debug for ObservableQueryMap<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableQueryMap")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("max_cached_queries", &self.config.max_cached_queries)
            .finish()
    }
}
