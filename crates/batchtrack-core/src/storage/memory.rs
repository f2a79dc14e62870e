//! In-memory store, the reference implementation of the storage
//! contract. Atomicity comes from staging every batch on a copy of the
//! state and swapping it in under the lock only once all mutations
//! validated.

use async_trait::async_trait;
use batchtrack_types::{EntityId, EntityType, ItemKey};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{transfer_not_found, Mutation, TransitionBatch, WorkItemStore};
use crate::audit::{AuditSink, LogEvent};
use crate::error::Result;
use crate::types::{Location, Outbox, Transfer, WorkItem};

#[derive(Debug, Clone, Default)]
struct MemoryInner {
    items: BTreeMap<ItemKey, WorkItem>,
    locations: BTreeMap<ItemKey, Location>,
    outboxes: BTreeMap<ItemKey, Outbox>,
    transfers: BTreeMap<ItemKey, Vec<Transfer>>,
    events: Vec<LogEvent>,
}

impl MemoryInner {
    fn apply_mutation(&mut self, mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::PutWorkItem(item) => {
                self.items.insert(item.key(), item);
            }
            Mutation::PutLocation(key, location) => {
                self.locations.insert(key, location);
            }
            Mutation::DeleteLocation(key) => {
                self.locations.remove(&key);
            }
            Mutation::PutOutbox(key, outbox) => {
                self.outboxes.insert(key, outbox);
            }
            Mutation::DeleteOutbox(key) => {
                self.outboxes.remove(&key);
            }
            Mutation::InsertTransfer(key, transfer) => {
                self.transfers.entry(key).or_default().push(transfer);
            }
            Mutation::UpdateTransfer(key, transfer) => {
                let ledger = self.transfers.entry(key.clone()).or_default();
                let row = ledger
                    .iter_mut()
                    .find(|t| t.transfer_id == transfer.transfer_id)
                    .ok_or_else(|| transfer_not_found(&key, &transfer.transfer_id))?;
                *row = transfer;
            }
            Mutation::DeletePendingTransfer(key) => {
                if let Some(ledger) = self.transfers.get_mut(&key) {
                    ledger.retain(|t| !t.is_pending());
                }
            }
        }
        Ok(())
    }
}

/// Mutex-guarded in-process store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryInner) -> T) -> T {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        f(&inner)
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn work_item(&self, key: &ItemKey) -> Result<Option<WorkItem>> {
        Ok(self.read(|inner| inner.items.get(key).cloned()))
    }

    async fn location(&self, key: &ItemKey) -> Result<Option<Location>> {
        Ok(self.read(|inner| inner.locations.get(key).cloned()))
    }

    async fn outbox(&self, key: &ItemKey) -> Result<Option<Outbox>> {
        Ok(self.read(|inner| inner.outboxes.get(key).cloned()))
    }

    async fn pending_transfer(&self, key: &ItemKey) -> Result<Option<Transfer>> {
        Ok(self.read(|inner| {
            inner
                .transfers
                .get(key)
                .and_then(|ledger| ledger.iter().find(|t| t.is_pending()).cloned())
        }))
    }

    async fn transfers(&self, key: &ItemKey) -> Result<Vec<Transfer>> {
        Ok(self.read(|inner| inner.transfers.get(key).cloned().unwrap_or_default()))
    }

    async fn children_of(&self, batch_id: &EntityId) -> Result<Vec<WorkItem>> {
        Ok(self.read(|inner| {
            inner
                .items
                .values()
                .filter(|item| {
                    item.entity_type == EntityType::ForeignUrgent && item.batch_id == *batch_id
                })
                .cloned()
                .collect()
        }))
    }

    async fn apply(&self, batch: TransitionBatch) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let mut staged = inner.clone();
        for mutation in batch.mutations() {
            staged.apply_mutation(mutation.clone())?;
        }
        *inner = staged;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append_event(&self, event: &LogEvent) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.events.push(event.clone());
        Ok(())
    }

    async fn read_events(&self) -> Result<Vec<LogEvent>> {
        Ok(self.read(|inner| inner.events.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchtrack_types::{Department, TransferId, WorkItemStatus};
    use crate::types::BatchAttributes;

    fn seeded_item() -> (MemoryStore, WorkItem) {
        let store = MemoryStore::new();
        let item = WorkItem::new_batch(5, 0, BatchAttributes::default(), None);
        (store, item)
    }

    #[tokio::test]
    async fn apply_commits_all_mutations() {
        let (store, item) = seeded_item();
        let key = item.key();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(item.clone()));
        batch.push(Mutation::PutLocation(key.clone(), Location::reception_draft(None)));
        store.apply(batch).await.unwrap();

        assert!(store.work_item(&key).await.unwrap().is_some());
        let location = store.location(&key).await.unwrap().unwrap();
        assert_eq!(location.department, Department::Reception);
        assert_eq!(location.status, WorkItemStatus::Current);
    }

    #[tokio::test]
    async fn failed_batch_leaves_state_untouched() {
        let (store, item) = seeded_item();
        let key = item.key();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(item.clone()));
        // References a ledger row that does not exist
        let mut phantom = Transfer::pending(
            Department::Reception,
            Department::Billing,
            WorkItemStatus::Inbox,
            None,
        );
        phantom.transfer_id = TransferId::new();
        batch.push(Mutation::UpdateTransfer(key.clone(), phantom));

        assert!(store.apply(batch).await.is_err());
        // The PutWorkItem that preceded the failing mutation must not stick
        assert!(store.work_item(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_pending_transfer_keeps_accepted_history() {
        let (store, item) = seeded_item();
        let key = item.key();

        let mut accepted = Transfer::pending(
            Department::Reception,
            Department::Admittance,
            WorkItemStatus::Inbox,
            None,
        );
        accepted.accepted_at = Some(chrono::Utc::now());
        let pending = Transfer::pending(
            Department::Admittance,
            Department::Billing,
            WorkItemStatus::Inbox,
            None,
        );

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::InsertTransfer(key.clone(), accepted.clone()));
        batch.push(Mutation::InsertTransfer(key.clone(), pending));
        store.apply(batch).await.unwrap();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::DeletePendingTransfer(key.clone()));
        store.apply(batch).await.unwrap();

        let ledger = store.transfers(&key).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].transfer_id, accepted.transfer_id);
        assert!(store.pending_transfer(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn children_lookup_filters_by_parent() {
        let (store, parent) = seeded_item();
        let child = WorkItem::new_foreign_urgent(
            parent.batch_id.clone(),
            BatchAttributes::default(),
            None,
        );
        let stranger = WorkItem::new_foreign_urgent(
            EntityId::new(),
            BatchAttributes::default(),
            None,
        );

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(parent.clone()));
        batch.push(Mutation::PutWorkItem(child.clone()));
        batch.push(Mutation::PutWorkItem(stranger));
        store.apply(batch).await.unwrap();

        let children = store.children_of(&parent.batch_id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].entity_id, child.entity_id);
    }
}
