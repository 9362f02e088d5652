use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use vendmap_core::{derive_view, Category, MachineDraft, OperatingStatus};
use vendmap_sync::{
    LiveView, MemoryStore, RegistrySync, StoreError, SubscriptionError, SyncEvent, SyncState,
    WriteGateway,
};

const COLL: &str = "vending_machines";

fn draft(description: &str, category: &str, status: &str) -> MachineDraft {
    MachineDraft {
        latitude: 35.6895,
        longitude: 139.6917,
        description: description.to_string(),
        category: category.to_string(),
        status: status.to_string(),
        payment_methods: vec!["cash".to_string()],
    }
}

fn observe(sync: &RegistrySync) -> mpsc::UnboundedReceiver<SyncEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    sync.on_change(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within timeout")
        .expect("observer still registered")
}

async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> Vec<String> {
    match next_event(rx).await {
        SyncEvent::Snapshot(snapshot) => snapshot.iter().map(|m| m.id.clone()).collect(),
        SyncEvent::Failed(err) => panic!("unexpected failure: {err}"),
    }
}

async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) {
    let extra = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err(), "unexpected extra event: {extra:?}");
}

#[tokio::test]
async fn each_push_is_delivered_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let gateway = WriteGateway::new(store.clone(), COLL);
    let sync = RegistrySync::new(store.clone(), COLL);
    let mut rx = observe(&sync);
    assert_eq!(sync.state(), SyncState::Uninitialized);

    sync.start();
    assert!(next_snapshot(&mut rx).await.is_empty());
    assert_eq!(sync.state(), SyncState::Live);
    assert_quiet(&mut rx).await;

    let first = gateway
        .create(draft("Station", "beverage", "operating"))
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut rx).await, vec![first.clone()]);
    assert_quiet(&mut rx).await;

    let second = gateway
        .create(draft("Park", "ice", "out-of-order"))
        .await
        .unwrap();
    assert_eq!(next_snapshot(&mut rx).await, vec![second.clone(), first]);
    assert_quiet(&mut rx).await;

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].id, second);
    assert!(!snapshot[0].has_image());
}

#[tokio::test]
async fn start_opens_a_single_subscription() {
    let store = Arc::new(MemoryStore::new());
    let sync = RegistrySync::new(store.clone(), COLL);
    let mut rx = observe(&sync);
    sync.start();
    sync.start();
    next_snapshot(&mut rx).await;
    assert_eq!(store.open_subscriptions(COLL), 1);
}

#[tokio::test]
async fn nothing_is_delivered_after_close() {
    let store = Arc::new(MemoryStore::new());
    let sync = RegistrySync::spawn(store.clone(), COLL);
    let mut rx = observe(&sync);
    // The initial push may or may not have landed before the observer was added.
    let gateway = WriteGateway::new(store.clone(), COLL);
    gateway
        .create(draft("Before close", "food", "operating"))
        .await
        .unwrap();
    loop {
        if next_snapshot(&mut rx).await.len() == 1 {
            break;
        }
    }

    sync.close();
    sync.close();
    assert_eq!(sync.state(), SyncState::Closed);

    gateway
        .create(draft("After close", "food", "operating"))
        .await
        .unwrap();
    store.republish(COLL);
    let after = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(matches!(after, Ok(None)), "observer should be gone: {after:?}");
    assert_eq!(sync.snapshot().len(), 1);
}

#[tokio::test]
async fn close_before_start_is_terminal() {
    let store = Arc::new(MemoryStore::new());
    let sync = RegistrySync::new(store.clone(), COLL);
    sync.close();
    sync.start();
    assert_eq!(sync.state(), SyncState::Closed);
    assert_eq!(store.open_subscriptions(COLL), 0);
}

#[tokio::test]
async fn open_failure_is_reported_once() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next_subscribe(StoreError::PermissionDenied("rules".to_string()));
    let sync = RegistrySync::new(store.clone(), COLL);
    let mut rx = observe(&sync);
    sync.start();

    match next_event(&mut rx).await {
        SyncEvent::Failed(SubscriptionError::Open { collection, source }) => {
            assert_eq!(collection, COLL);
            assert_eq!(source, StoreError::PermissionDenied("rules".to_string()));
        }
        other => panic!("expected open failure, got {other:?}"),
    }
    assert_quiet(&mut rx).await;
    assert!(matches!(sync.state(), SyncState::Failed(_)));

    // No retry.
    sync.start();
    assert_eq!(store.open_subscriptions(COLL), 0);
}

#[tokio::test]
async fn feed_error_is_terminal() {
    let store = Arc::new(MemoryStore::new());
    let sync = RegistrySync::new(store.clone(), COLL);
    let mut rx = observe(&sync);
    sync.start();
    next_snapshot(&mut rx).await;

    store.push_error(COLL, &StoreError::Unavailable("connection reset".to_string()));
    assert!(matches!(
        next_event(&mut rx).await,
        SyncEvent::Failed(SubscriptionError::Feed { .. })
    ));
    store.republish(COLL);
    assert_quiet(&mut rx).await;
    assert!(sync.state().is_terminal());
}

#[tokio::test]
async fn live_view_follows_snapshots_and_filters() {
    let store = Arc::new(MemoryStore::new());
    let gateway = WriteGateway::new(store.clone(), COLL);
    gateway
        .create(draft("A", "beverage", "operating"))
        .await
        .unwrap();
    gateway
        .create(draft("B", "ice", "out-of-order"))
        .await
        .unwrap();

    let sync = RegistrySync::new(store.clone(), COLL);
    let view = LiveView::attach(&sync);
    let mut changes = view.subscribe();
    sync.start();
    tokio::time::timeout(Duration::from_secs(2), changes.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.current().machines.len(), 2);

    view.set_category(Some(Category::Ice));
    let current = view.current();
    assert_eq!(current.machines.len(), 1);
    assert_eq!(current.machines[0].description, "B");
    assert_eq!(current.counts.total, 2);
    assert_eq!(current.counts.operating, 1);
    assert_eq!(current.counts.out_of_order, 1);

    view.set_status(Some(OperatingStatus::Operating));
    assert!(view.current().machines.is_empty());
    assert_eq!(view.current().counts.total, 2);

    view.clear_filters();
    assert_eq!(view.current().machines.len(), 2);
    assert!(view.filter().is_empty());
    assert!(view.last_error().is_none());
}

#[tokio::test]
async fn observer_can_close_the_registry_mid_delivery() {
    let store = Arc::new(MemoryStore::new());
    let sync = Arc::new(RegistrySync::new(store.clone(), COLL));
    let (closed_tx, mut closed) = mpsc::unbounded_channel();
    let handle = Arc::downgrade(&sync);
    sync.on_change(move |event| {
        if let (SyncEvent::Snapshot(_), Some(sync)) = (event, handle.upgrade()) {
            sync.close();
            let _ = closed_tx.send(());
        }
    });
    let mut later = observe(&sync);

    sync.start();
    tokio::time::timeout(Duration::from_secs(2), closed.recv())
        .await
        .expect("close returns inside the callback")
        .expect("closing observer ran");
    assert_eq!(sync.state(), SyncState::Closed);

    // The observer after the closing one is skipped and then discarded.
    let after = tokio::time::timeout(Duration::from_millis(100), later.recv()).await;
    assert!(matches!(after, Ok(None)), "observer should be gone: {after:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn live_view_matches_its_filter_under_concurrent_pushes() {
    let store = Arc::new(MemoryStore::new());
    let gateway = WriteGateway::new(store.clone(), COLL);
    gateway
        .create(draft("A", "beverage", "operating"))
        .await
        .unwrap();
    gateway
        .create(draft("B", "ice", "operating"))
        .await
        .unwrap();

    let sync = RegistrySync::new(store.clone(), COLL);
    let view = Arc::new(LiveView::attach(&sync));
    let mut changes = view.subscribe();
    sync.start();
    tokio::time::timeout(Duration::from_secs(2), changes.changed())
        .await
        .unwrap()
        .unwrap();

    let pusher = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..500 {
                store.republish(COLL);
            }
        })
    };
    let setter = {
        let view = Arc::clone(&view);
        tokio::task::spawn_blocking(move || {
            for i in 0..500 {
                let category = (i % 2 == 0).then_some(Category::Ice);
                view.set_category(category);
            }
        })
    };
    pusher.await.unwrap();
    setter.await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(view.filter().category.is_none());
    let expected = derive_view(&sync.snapshot(), &view.filter());
    assert_eq!(*view.current(), expected);
    assert_eq!(view.current().machines.len(), 2);
}

#[tokio::test]
async fn dropped_live_view_stops_observing() {
    let store = Arc::new(MemoryStore::new());
    let sync = RegistrySync::new(store.clone(), COLL);
    let view = LiveView::attach(&sync);
    let mut changes = view.subscribe();
    drop(view);

    sync.start();
    let changed = tokio::time::timeout(Duration::from_secs(1), changes.changed())
        .await
        .expect("sender closes instead of publishing");
    assert!(changed.is_err());

    let registration = sync.observe(|_| {});
    let id = registration.id();
    drop(registration);
    assert!(!sync.remove_observer(id));
}
