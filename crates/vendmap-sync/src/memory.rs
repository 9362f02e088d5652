//! In-process [`RemoteStore`] with push semantics.
//!
//! Behaves like a hosted document store: identifiers and timestamps are
//! assigned here, every write re-pushes the full collection to each open
//! subscription, and failures can be injected for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use vendmap_core::{Machine, MachinePatch, NewMachine};

use crate::remote::{
    sort_machines, FeedEvent, FeedSender, Ordering, Query, RemoteStore, StoreError, Subscription,
};

#[derive(Default)]
struct Collection {
    docs: HashMap<String, Machine>,
    feeds: Vec<(Ordering, FeedSender)>,
}

impl Collection {
    fn ordered(&self, order: Ordering) -> Vec<Machine> {
        let mut machines: Vec<Machine> = self.docs.values().cloned().collect();
        sort_machines(&mut machines, order);
        machines
    }

    fn publish(&mut self) {
        let mut cache: HashMap<Ordering, Vec<Machine>> = HashMap::new();
        let docs = &self.docs;
        self.feeds.retain(|(order, feed)| {
            let snapshot = cache
                .entry(*order)
                .or_insert_with(|| {
                    let mut machines: Vec<Machine> = docs.values().cloned().collect();
                    sort_machines(&mut machines, *order);
                    machines
                })
                .clone();
            feed.send(FeedEvent::Snapshot(snapshot))
        });
    }
}

#[derive(Default)]
struct State {
    collections: HashMap<String, Collection>,
    last_stamp: Option<DateTime<Utc>>,
    fail_next_subscribe: Option<StoreError>,
    fail_writes: Option<StoreError>,
}

impl State {
    /// Server clock: wall time, forced strictly forward between writes.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        match &self.fail_writes {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `subscribe` call fail with `err`.
    pub fn fail_next_subscribe(&self, err: StoreError) {
        self.state().fail_next_subscribe = Some(err);
    }

    /// Make every write fail with `err` until cleared with `None`.
    pub fn fail_writes(&self, err: Option<StoreError>) {
        self.state().fail_writes = err;
    }

    /// Push an error event to every open subscription on `collection`.
    pub fn push_error(&self, collection: &str, err: &StoreError) {
        if let Some(coll) = self.state().collections.get_mut(collection) {
            coll.feeds
                .retain(|(_, feed)| feed.send(FeedEvent::Error(err.clone())));
        }
    }

    /// Re-push the current contents without a write.
    pub fn republish(&self, collection: &str) {
        if let Some(coll) = self.state().collections.get_mut(collection) {
            coll.publish();
        }
    }

    /// Number of subscriptions that have not been cancelled.
    #[must_use]
    pub fn open_subscriptions(&self, collection: &str) -> usize {
        self.state().collections.get(collection).map_or(0, |c| {
            c.feeds.iter().filter(|(_, f)| !f.is_cancelled()).count()
        })
    }

    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create(&self, collection: &str, machine: NewMachine) -> Result<String, StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let stamp = state.stamp();
        let coll = state.collections.entry(collection.to_string()).or_default();
        coll.docs
            .insert(id.clone(), machine.into_machine(id.clone(), stamp));
        coll.publish();
        debug!(collection, machine_id = %id, "memory store: created");
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: MachinePatch,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        let stamp = state.stamp();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection, id))?;
        let machine = coll
            .docs
            .get_mut(id)
            .ok_or_else(|| not_found(collection, id))?;
        patch.apply_to(machine);
        machine.last_updated = stamp;
        coll.publish();
        debug!(collection, machine_id = id, "memory store: updated");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        if let Some(coll) = state.collections.get_mut(collection) {
            if coll.docs.remove(id).is_some() {
                coll.publish();
                debug!(collection, machine_id = id, "memory store: deleted");
            }
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Machine>, StoreError> {
        Ok(self
            .state()
            .collections
            .get(collection)
            .and_then(|c| c.docs.get(id).cloned()))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Machine>, StoreError> {
        let state = self.state();
        let Some(coll) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .ordered(query.order)
            .into_iter()
            .filter(|m| query.filter.matches(m))
            .collect())
    }

    async fn subscribe(
        &self,
        collection: &str,
        order: Ordering,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.state();
        if let Some(err) = state.fail_next_subscribe.take() {
            return Err(err);
        }
        let coll = state.collections.entry(collection.to_string()).or_default();
        let (feed, subscription) = Subscription::channel();
        feed.send(FeedEvent::Snapshot(coll.ordered(order)));
        coll.feeds.push((order, feed));
        debug!(collection, "memory store: subscription opened");
        Ok(subscription)
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}
