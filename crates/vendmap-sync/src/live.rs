//! Filter state bound to a running registry.
//!
//! A [`LiveView`] recomputes the [`DerivedView`] whenever the registry pushes
//! a new snapshot or the filter changes, and publishes it on a watch channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use vendmap_core::{derive_view, Category, DerivedView, FilterState, OperatingStatus};

use crate::registry::{Registration, RegistrySync, Snapshot, SubscriptionError, SyncEvent};

/// Filter and snapshot change together so a published view always matches
/// both.
struct Inputs {
    filter: FilterState,
    snapshot: Snapshot,
}

struct Inner {
    inputs: Mutex<Inputs>,
    error: Mutex<Option<SubscriptionError>>,
    view: watch::Sender<Arc<DerivedView>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    /// Apply `change` and publish the resulting view without releasing the
    /// inputs lock in between.
    fn update(&self, change: impl FnOnce(&mut Inputs)) {
        let mut inputs = lock(&self.inputs);
        change(&mut inputs);
        self.view
            .send_replace(Arc::new(derive_view(&inputs.snapshot, &inputs.filter)));
    }

    fn handle(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Snapshot(snapshot) => {
                self.update(|inputs| inputs.snapshot = Arc::clone(snapshot));
            }
            SyncEvent::Failed(err) => *lock(&self.error) = Some(err.clone()),
        }
    }
}

/// Filtered view of a registry. Dropping it stops recomputation.
pub struct LiveView {
    inner: Arc<Inner>,
    registration: Registration,
}

impl LiveView {
    /// Bind to `sync`, starting from its current snapshot and an empty filter.
    #[must_use]
    pub fn attach(sync: &RegistrySync) -> Self {
        let snapshot = sync.snapshot();
        let initial = derive_view(&snapshot, &FilterState::default());
        let (view, _) = watch::channel(Arc::new(initial));
        let inner = Arc::new(Inner {
            inputs: Mutex::new(Inputs {
                filter: FilterState::default(),
                snapshot,
            }),
            error: Mutex::new(None),
            view,
        });
        let handler = Arc::clone(&inner);
        let registration = sync.observe(move |event| handler.handle(event));
        Self {
            inner,
            registration,
        }
    }

    pub fn set_category(&self, category: Option<Category>) {
        self.inner.update(|inputs| inputs.filter.category = category);
    }

    pub fn set_status(&self, status: Option<OperatingStatus>) {
        self.inner.update(|inputs| inputs.filter.status = status);
    }

    pub fn clear_filters(&self) {
        self.inner
            .update(|inputs| inputs.filter = FilterState::default());
    }

    #[must_use]
    pub fn filter(&self) -> FilterState {
        lock(&self.inner.inputs).filter
    }

    #[must_use]
    pub fn current(&self) -> Arc<DerivedView> {
        Arc::clone(&self.inner.view.borrow())
    }

    /// Receiver that is marked changed on every recomputation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<DerivedView>> {
        self.inner.view.subscribe()
    }

    /// The terminal subscription failure, if the registry reported one.
    #[must_use]
    pub fn last_error(&self) -> Option<SubscriptionError> {
        lock(&self.inner.error).clone()
    }

    /// Stop following the registry. The last computed view stays readable.
    pub fn detach(&self) {
        self.registration.remove();
    }
}
