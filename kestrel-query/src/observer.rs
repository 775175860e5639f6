//! Change notification for observable queries.
//!
//! Observers are plain callbacks run synchronously on the task that caused
//! the transition. There is no batching or debouncing here; a UI binding
//! that wants either does it on its side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use kestrel_core::QueryError;

use crate::envelope::ResponseEnvelope;

/// A state transition of one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent<T> {
    /// A fetch with this epoch was started.
    FetchStarted { epoch: u64 },
    /// A fetch succeeded and its envelope is now visible.
    FetchSucceeded { envelope: ResponseEnvelope<T> },
    /// A fetch failed; the previous envelope (if any) is still visible.
    FetchFailed { epoch: u64, error: QueryError },
    /// A fetch completed after a newer one was started; its result was dropped.
    Discarded { epoch: u64 },
    /// A persisted envelope was loaded before the first network fetch.
    Restored { envelope: ResponseEnvelope<T> },
}

impl<T> QueryEvent<T> {
    /// Epoch the event refers to.
    pub fn epoch(&self) -> u64 {
        match self {
            Self::FetchStarted { epoch }
            | Self::FetchFailed { epoch, .. }
            | Self::Discarded { epoch } => *epoch,
            Self::FetchSucceeded { envelope } | Self::Restored { envelope } => envelope.epoch,
        }
    }
}

/// Callback invoked for every event.
pub type Observer<T> = Arc<dyn Fn(&QueryEvent<T>) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Registered observers of one query.
pub(crate) struct ObserverSet<T> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ObserverSet<T> {
    pub(crate) fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        Subscription(id)
    }

    pub(crate) fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription.0);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Call every observer with the event built by `make`.
    ///
    /// The event is only built when someone is listening. Observers run
    /// outside the registry lock so they may subscribe or unsubscribe.
    pub(crate) fn notify(&self, make: impl FnOnce() -> QueryEvent<T>) {
        let snapshot: Vec<Observer<T>> = {
            let observers = self
                .observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if observers.is_empty() {
                return;
            }
            observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        let event = make();
        for observer in snapshot {
            observer(&event);
        }
    }
}
