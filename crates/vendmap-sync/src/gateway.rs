//! Typed writes against the remote store.
//!
//! Creation is validated locally and never reaches the store when a rule is
//! broken. Updates and deletes pass straight through. The effect of every
//! write is observed later through the subscription feed; nothing here
//! mutates a local snapshot.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use vendmap_core::{MachineDraft, MachinePatch, ValidationError};

use crate::remote::{RemoteStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{op} failed: {source}")]
    Remote {
        op: WriteOp,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    /// The rule violations, when the write was rejected before reaching the store.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&[String]> {
        match self {
            WriteError::Validation(err) => Some(&err.errors),
            WriteError::Remote { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct WriteGateway {
    store: Arc<dyn RemoteStore>,
    collection: String,
}

impl WriteGateway {
    pub fn new(store: Arc<dyn RemoteStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Validate `draft` and create the record. Returns the store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Validation`] with every violated rule (no remote
    /// call is made), or [`WriteError::Remote`] when the store rejects the write.
    pub async fn create(&self, draft: MachineDraft) -> Result<String, WriteError> {
        let machine = draft.into_new_machine()?;
        let id = self
            .store
            .create(&self.collection, machine)
            .await
            .map_err(|source| remote_failure(WriteOp::Create, &self.collection, source))?;
        info!(collection = %self.collection, machine_id = %id, "machine created");
        Ok(id)
    }

    /// Partial update. Fields are not re-validated so internal updates such as
    /// attaching image URLs are never blocked.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Remote`] when the store rejects the write.
    pub async fn update(&self, id: &str, patch: MachinePatch) -> Result<(), WriteError> {
        self.store
            .update(&self.collection, id, patch)
            .await
            .map_err(|source| remote_failure(WriteOp::Update, &self.collection, source))?;
        info!(collection = %self.collection, machine_id = id, "machine updated");
        Ok(())
    }

    /// Unconditional delete. Deleting an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Remote`] when the store rejects the write.
    pub async fn delete(&self, id: &str) -> Result<(), WriteError> {
        self.store
            .delete(&self.collection, id)
            .await
            .map_err(|source| remote_failure(WriteOp::Delete, &self.collection, source))?;
        info!(collection = %self.collection, machine_id = id, "machine deleted");
        Ok(())
    }
}

fn remote_failure(op: WriteOp, collection: &str, source: StoreError) -> WriteError {
    warn!(collection, %op, error = %source, "remote write failed");
    WriteError::Remote { op, source }
}
