//! Live integration tests for vendmap-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness from `DATABASE_URL`. The `migrations` path is relative
//! to the crate root (`crates/vendmap-db/`).

use std::time::Duration;

use chrono::Utc;
use vendmap_core::{
    Category, Coordinate, FilterState, ImageRef, Machine, MachinePatch, NewMachine,
    OperatingStatus, PaymentMethod,
};
use vendmap_db::PgStore;
use vendmap_sync::{FeedEvent, Ordering, Query, RemoteStore, StoreError, Subscription};

const COLL: &str = "vending_machines";

fn new_machine(description: &str, category: Category) -> NewMachine {
    NewMachine {
        coordinate: Coordinate::new(35.6895, 139.6917),
        description: description.to_string(),
        category,
        status: OperatingStatus::Operating,
        payment_methods: vec![PaymentMethod::Cash, PaymentMethod::Card],
    }
}

async fn next_snapshot(sub: &mut Subscription) -> Vec<Machine> {
    let event = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("push within timeout");
    match event {
        Some(FeedEvent::Snapshot(machines)) => machines,
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn create_get_update_delete(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let id = store
        .create(COLL, new_machine("Station", Category::Beverage))
        .await
        .unwrap();

    let created = store.get(COLL, &id).await.unwrap().unwrap();
    assert_eq!(created.description, "Station");
    assert!(!created.has_image());

    let image = ImageRef {
        image_url: "https://cdn/full.jpg".to_string(),
        thumbnail_url: "https://cdn/thumb.jpg".to_string(),
        uploaded_at: Utc::now(),
    };
    store
        .update(COLL, &id, MachinePatch::attach_image(image))
        .await
        .unwrap();
    let updated = store.get(COLL, &id).await.unwrap().unwrap();
    assert!(updated.has_image());
    assert!(updated.last_updated > created.last_updated);

    store.delete(COLL, &id).await.unwrap();
    store.delete(COLL, &id).await.unwrap();
    assert!(store.get(COLL, &id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_of_missing_id_is_not_found(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let err = store
        .update(COLL, "missing", MachinePatch::status(OperatingStatus::OutOfOrder))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn query_filters_and_orders(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let a = store.create(COLL, new_machine("A", Category::Ice)).await.unwrap();
    store.create(COLL, new_machine("B", Category::Food)).await.unwrap();
    let c = store.create(COLL, new_machine("C", Category::Ice)).await.unwrap();
    store.create("other_collection", new_machine("D", Category::Ice)).await.unwrap();

    let query = Query {
        filter: FilterState::default().with_category(Some(Category::Ice)),
        order: Ordering::LastUpdatedDesc,
    };
    let ids: Vec<String> = store
        .query(COLL, &query)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![c, a]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn subscription_pushes_full_collection_on_change(pool: sqlx::PgPool) {
    let store = PgStore::new(pool);
    let mut sub = store.subscribe(COLL, Ordering::LastUpdatedDesc).await.unwrap();
    assert!(next_snapshot(&mut sub).await.is_empty());

    let first = store.create(COLL, new_machine("A", Category::Food)).await.unwrap();
    let snapshot = next_snapshot(&mut sub).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, first);

    store.delete(COLL, &first).await.unwrap();
    assert!(next_snapshot(&mut sub).await.is_empty());

    sub.cancel();
}
