//! Storage abstraction for work items and their workflow rows
//!
//! Each orchestrator operation builds one [`TransitionBatch`] and hands
//! it to [`WorkItemStore::apply`], which commits all mutations or none.
//! A half-applied transition (location updated, outbox missing) must
//! never be observable.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use batchtrack_types::{EntityId, ItemKey, TransferId};

use crate::error::Result;
use crate::types::{Location, Outbox, Transfer, WorkItem};

/// One row-level mutation inside a transition
#[derive(Debug, Clone)]
pub enum Mutation {
    PutWorkItem(WorkItem),
    PutLocation(ItemKey, Location),
    DeleteLocation(ItemKey),
    PutOutbox(ItemKey, Outbox),
    DeleteOutbox(ItemKey),
    InsertTransfer(ItemKey, Transfer),
    /// Update an existing ledger row in place, matched by transfer id
    UpdateTransfer(ItemKey, Transfer),
    /// Invalidate the pending ledger row, if any
    DeletePendingTransfer(ItemKey),
}

/// The mutations of one workflow operation, committed atomically
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    mutations: Vec<Mutation>,
}

impl TransitionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

/// Transactional per-work-item storage.
///
/// Reads are point lookups; writes go through [`Self::apply`] which is
/// the single commit point of an operation.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    async fn work_item(&self, key: &ItemKey) -> Result<Option<WorkItem>>;

    async fn location(&self, key: &ItemKey) -> Result<Option<Location>>;

    async fn outbox(&self, key: &ItemKey) -> Result<Option<Outbox>>;

    /// The at-most-one pending transfer ledger row for this item
    async fn pending_transfer(&self, key: &ItemKey) -> Result<Option<Transfer>>;

    /// Full transfer ledger for this item in insertion order
    async fn transfers(&self, key: &ItemKey) -> Result<Vec<Transfer>>;

    /// Foreign/urgent sub-cases attached to a batch
    async fn children_of(&self, batch_id: &EntityId) -> Result<Vec<WorkItem>>;

    /// Commit a transition: every mutation applies, or none do
    async fn apply(&self, batch: TransitionBatch) -> Result<()>;
}

pub(crate) fn transfer_not_found(key: &ItemKey, transfer_id: &TransferId) -> crate::error::TrackError {
    crate::error::TrackError::Storage(format!(
        "transfer {} for {} does not exist",
        transfer_id, key
    ))
}
