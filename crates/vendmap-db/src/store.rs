//! [`RemoteStore`] backed by Postgres.
//!
//! Writes go through the `machines` table. Subscriptions combine a
//! `LISTEN machines_changed` connection with a full re-query of the
//! collection on every notification, so each push carries the complete
//! ordered result set.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use vendmap_core::{FilterState, Machine, MachinePatch, NewMachine};
use vendmap_sync::{
    FeedEvent, FeedSender, Ordering, Query, RemoteStore, StoreError, Subscription,
};

use crate::machines::{
    delete_machine, get_machine, insert_machine, list_machines, update_machine, MachineRow,
    NOTIFY_CHANNEL,
};
use crate::DbError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_error(err: impl Into<DbError>) -> StoreError {
    StoreError::from(err.into())
}

/// Fetch and convert a whole collection. Rows that no longer map onto the
/// domain model are skipped so one bad row cannot blank the feed.
async fn fetch_collection(
    pool: &PgPool,
    collection: &str,
    filter: &FilterState,
    order: Ordering,
) -> Result<Vec<Machine>, StoreError> {
    let rows = list_machines(pool, collection, filter, order)
        .await
        .map_err(store_error)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.into_machine() {
            Ok(machine) => Some(machine),
            Err(err) => {
                warn!(collection, error = %err, "skipping malformed machine row");
                None
            }
        })
        .collect())
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn create(&self, collection: &str, machine: NewMachine) -> Result<String, StoreError> {
        insert_machine(&self.pool, collection, &machine)
            .await
            .map_err(store_error)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: MachinePatch,
    ) -> Result<(), StoreError> {
        let touched = update_machine(&self.pool, collection, id, &patch)
            .await
            .map_err(store_error)?;
        if touched == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        delete_machine(&self.pool, collection, id)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Machine>, StoreError> {
        get_machine(&self.pool, collection, id)
            .await
            .map_err(store_error)?
            .map(MachineRow::into_machine)
            .transpose()
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Machine>, StoreError> {
        fetch_collection(&self.pool, collection, &query.filter, query.order).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        order: Ordering,
    ) -> Result<Subscription, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(store_error)?;
        listener.listen(NOTIFY_CHANNEL).await.map_err(store_error)?;

        let initial =
            fetch_collection(&self.pool, collection, &FilterState::default(), order).await?;
        let (feed, subscription) = Subscription::channel();
        feed.send(FeedEvent::Snapshot(initial));

        tokio::spawn(pump(
            self.pool.clone(),
            listener,
            collection.to_string(),
            order,
            feed,
        ));
        info!(collection, "postgres subscription opened");
        Ok(subscription)
    }
}

/// Forward change notifications as fresh snapshots until the consumer
/// cancels or the feed breaks.
async fn pump(
    pool: PgPool,
    mut listener: PgListener,
    collection: String,
    order: Ordering,
    feed: FeedSender,
) {
    loop {
        let notification = tokio::select! {
            () = feed.cancelled() => break,
            notification = listener.try_recv() => notification,
        };

        match notification {
            Ok(Some(n)) if n.payload() != collection => continue,
            // Some(_) for our collection, or None after a reconnect where
            // notifications may have been missed: resync either way.
            Ok(_) => {}
            Err(err) => {
                feed.send(FeedEvent::Error(store_error(err)));
                break;
            }
        }

        match fetch_collection(&pool, &collection, &FilterState::default(), order).await {
            Ok(machines) => {
                debug!(collection = %collection, records = machines.len(), "pushing snapshot");
                if !feed.send(FeedEvent::Snapshot(machines)) {
                    break;
                }
            }
            Err(err) => {
                feed.send(FeedEvent::Error(err));
                break;
            }
        }
    }
    debug!(collection = %collection, "postgres subscription closed");
}
