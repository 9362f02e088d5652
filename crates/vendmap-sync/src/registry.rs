//! Realtime mirror of the machine collection.
//!
//! A [`RegistrySync`] owns exactly one subscription on the remote store. Each
//! push replaces the whole snapshot and is delivered to every registered
//! observer. Lifecycle:
//!
//! ```text
//! Uninitialized -> Subscribing -> Live -> Failed | Closed
//! ```
//!
//! A subscription that cannot be opened, reports an error, or ends on its own
//! is terminal: the instance moves to `Failed`, observers hear about it once,
//! and nothing is retried. `close` is idempotent and safe from any state.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vendmap_core::Machine;

use crate::remote::{FeedEvent, Ordering, RemoteStore, StoreError};

/// Immutable, shareable view of the collection, newest update first.
pub type Snapshot = Arc<[Machine]>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    #[error("failed to open subscription on {collection}: {source}")]
    Open {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("subscription on {collection} failed: {source}")]
    Feed {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("subscription on {collection} ended unexpectedly")]
    Ended { collection: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Uninitialized,
    Subscribing,
    Live,
    Failed(SubscriptionError),
    Closed,
}

impl SyncState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Failed(_) | SyncState::Closed)
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Snapshot(Snapshot),
    Failed(SubscriptionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Shared {
    collection: String,
    state: Mutex<SyncState>,
    snapshot: Mutex<Snapshot>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Deliver `event` to the observers registered at call time. The list lock
    /// is not held while an observer runs, so observers may close the registry
    /// or change registrations. Delivery stops as soon as the registry closes.
    fn notify(&self, event: &SyncEvent) {
        let observers: Vec<Observer> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            if *lock(&self.state) == SyncState::Closed {
                return;
            }
            observer(event);
        }
    }

    fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn go_live(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SyncState::Subscribing {
            *state = SyncState::Live;
            true
        } else {
            false
        }
    }

    fn apply(&self, machines: Vec<Machine>) {
        if *lock(&self.state) != SyncState::Live {
            return;
        }
        let snapshot: Snapshot = machines.into();
        *lock(&self.snapshot) = Arc::clone(&snapshot);
        debug!(collection = %self.collection, records = snapshot.len(), "snapshot applied");
        self.notify(&SyncEvent::Snapshot(snapshot));
    }

    fn fail(&self, err: SubscriptionError) {
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return;
            }
            *state = SyncState::Failed(err.clone());
        }
        warn!(collection = %self.collection, error = %err, "subscription failed");
        self.notify(&SyncEvent::Failed(err));
    }
}

pub struct RegistrySync {
    store: Arc<dyn RemoteStore>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RegistrySync {
    pub fn new(store: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            shared: Arc::new(Shared {
                collection: collection.into(),
                state: Mutex::new(SyncState::Uninitialized),
                snapshot: Mutex::new(Vec::new().into()),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Create and immediately [`start`](Self::start). Must run inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        let sync = Self::new(store, collection);
        sync.start();
        sync
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    /// Register an observer. It is called synchronously for every snapshot
    /// push and once for a terminal failure. An observer registered or
    /// removed from inside a callback takes effect from the next event.
    pub fn on_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer.fetch_add(1, AtomicOrdering::Relaxed));
        if *lock(&self.shared.state) != SyncState::Closed {
            lock(&self.shared.observers).push((id, Arc::new(observer)));
        }
        id
    }

    /// Like [`on_change`](Self::on_change), but the observer is removed when
    /// the returned [`Registration`] is dropped.
    pub fn observe<F>(&self, observer: F) -> Registration
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        Registration {
            shared: Arc::downgrade(&self.shared),
            id: self.on_change(observer),
        }
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.shared.remove_observer(id)
    }

    /// Open the subscription. Only the first call has an effect; later calls,
    /// including after `close`, are ignored. Must run inside a Tokio runtime.
    pub fn start(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state != SyncState::Uninitialized {
                return;
            }
            *state = SyncState::Subscribing;
        }
        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(run(store, shared));
        let mut slot = lock(&self.task);
        if *lock(&self.shared.state) == SyncState::Closed {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }

    /// Tear down the subscription and discard every observer. Idempotent.
    pub fn close(&self) {
        {
            let mut state = lock(&self.shared.state);
            if *state == SyncState::Closed {
                return;
            }
            *state = SyncState::Closed;
        }
        lock(&self.shared.observers).clear();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        info!(collection = %self.shared.collection, "subscription closed");
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        lock(&self.shared.state).clone()
    }

    /// The latest snapshot. Empty until the first push arrives.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&lock(&self.shared.snapshot))
    }
}

impl Drop for RegistrySync {
    fn drop(&mut self) {
        self.close();
    }
}

/// Observer registration that is removed on drop. Outliving the registry is
/// harmless.
#[derive(Debug)]
pub struct Registration {
    shared: Weak<Shared>,
    id: ObserverId,
}

impl Registration {
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Remove the observer now. Returns `false` if it was already gone.
    pub fn remove(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.remove_observer(self.id))
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for RegistrySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySync")
            .field("collection", &self.shared.collection)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn run(store: Arc<dyn RemoteStore>, shared: Arc<Shared>) {
    let collection = shared.collection.clone();
    let mut subscription = match store.subscribe(&collection, Ordering::LastUpdatedDesc).await {
        Ok(subscription) => subscription,
        Err(source) => {
            shared.fail(SubscriptionError::Open { collection, source });
            return;
        }
    };
    if !shared.go_live() {
        return;
    }
    info!(collection = %collection, "subscription live");

    loop {
        match subscription.next().await {
            Some(FeedEvent::Snapshot(machines)) => shared.apply(machines),
            Some(FeedEvent::Error(source)) => {
                shared.fail(SubscriptionError::Feed { collection, source });
                break;
            }
            None => {
                shared.fail(SubscriptionError::Ended { collection });
                break;
            }
        }
    }
    subscription.cancel();
}
