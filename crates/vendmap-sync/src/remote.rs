//! The remote store seam.
//!
//! Implementations own persistence and the push feed. They assign record
//! identifiers, stamp `last_updated` on every create and update, and push the
//! complete ordered collection to every open [`Subscription`] after each
//! change.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use vendmap_core::{FilterState, Machine, MachinePatch, NewMachine};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },

    #[error("malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ordering {
    #[default]
    LastUpdatedDesc,
    LastUpdatedAsc,
}

/// One-shot query: optional category/status equality plus ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: FilterState,
    pub order: Ordering,
}

/// What a subscription yields: the full ordered collection, or a feed failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Snapshot(Vec<Machine>),
    Error(StoreError),
}

/// Producer half of a subscription, held by the store implementation.
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedSender {
    /// Push an event. Returns `false` once the consumer has cancelled or gone away.
    pub fn send(&self, event: FeedEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the consumer cancels or drops its [`Subscription`].
    pub async fn cancelled(&self) {
        self.tx.closed().await;
    }
}

/// Consumer half of a continuous query. Dropping it cancels the feed.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl Subscription {
    /// Create a connected producer/consumer pair.
    #[must_use]
    pub fn channel() -> (FeedSender, Subscription) {
        let (tx, events) = mpsc::unbounded_channel();
        (FeedSender { tx }, Subscription { events })
    }

    /// Next pushed event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Stop the feed. Events already queued are discarded.
    pub fn cancel(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a new record and return its store-assigned identifier.
    async fn create(&self, collection: &str, machine: NewMachine) -> Result<String, StoreError>;

    /// Apply a partial update and refresh `last_updated`.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: MachinePatch,
    ) -> Result<(), StoreError>;

    /// Remove a record. Removing an unknown id succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Machine>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Machine>, StoreError>;

    /// Open a continuous query over the whole collection. The current
    /// contents are pushed immediately, then again after every change.
    async fn subscribe(
        &self,
        collection: &str,
        order: Ordering,
    ) -> Result<Subscription, StoreError>;
}

/// Sort `machines` in place according to `order`. Ties fall back to id so
/// every store produces the same sequence for the same contents.
pub fn sort_machines(machines: &mut [Machine], order: Ordering) {
    machines.sort_by(|a, b| {
        let by_time = match order {
            Ordering::LastUpdatedDesc => b.last_updated.cmp(&a.last_updated),
            Ordering::LastUpdatedAsc => a.last_updated.cmp(&b.last_updated),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed_by_producer() {
        let (tx, mut sub) = Subscription::channel();
        assert!(!tx.is_cancelled());
        assert!(tx.send(FeedEvent::Snapshot(vec![])));

        sub.cancel();
        assert!(tx.is_cancelled());
        assert!(!tx.send(FeedEvent::Snapshot(vec![])));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_cancels_feed() {
        let (tx, sub) = Subscription::channel();
        drop(sub);
        tx.cancelled().await;
        assert!(tx.is_cancelled());
    }

    #[tokio::test]
    async fn feed_ends_when_producer_drops() {
        let (tx, mut sub) = Subscription::channel();
        tx.send(FeedEvent::Error(StoreError::Unavailable("down".to_string())));
        drop(tx);
        assert!(matches!(sub.next().await, Some(FeedEvent::Error(_))));
        assert!(sub.next().await.is_none());
    }
}
