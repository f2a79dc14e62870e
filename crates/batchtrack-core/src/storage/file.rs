//! File-backed store: one JSON document per record, a JSON-lines audit
//! log, and staged temp-file writes renamed into place at commit.
//!
//! Atomicity is in-process: operations serialize behind a lock and a
//! batch is fully staged before the first rename.

use async_trait::async_trait;
use batchtrack_types::{EntityId, EntityType, ItemKey};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{transfer_not_found, Mutation, TransitionBatch, WorkItemStore};
use crate::audit::{AuditSink, LogEvent};
use crate::error::{Result, TrackError};
use crate::types::{Location, Outbox, Transfer, WorkItem};

const ITEMS_DIR: &str = "items";
const LOCATIONS_DIR: &str = "locations";
const OUTBOX_DIR: &str = "outbox";
const TRANSFERS_DIR: &str = "transfers";
const LOG_DIR: &str = "log";
const EVENTS_FILE: &str = "events.jsonl";

/// JSON-file store rooted at a data directory
pub struct FileStore {
    root_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create the store, building the directory structure if needed
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        for dir in &[ITEMS_DIR, LOCATIONS_DIR, OUTBOX_DIR, TRANSFERS_DIR, LOG_DIR] {
            fs::create_dir_all(root_path.join(dir))?;
        }
        Ok(Self {
            root_path,
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, dir: &str, key: &ItemKey) -> PathBuf {
        self.root_path
            .join(dir)
            .join(format!("{}_{}.json", key.entity_type, key.entity_id))
    }

    fn events_path(&self) -> PathBuf {
        self.root_path.join(LOG_DIR).join(EVENTS_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let record = serde_json::from_str(&json).map_err(|e| {
            TrackError::Serialization(format!("corrupt record {}: {}", path.display(), e))
        })?;
        Ok(Some(record))
    }

    fn load_ledger(&self, key: &ItemKey) -> Result<Vec<Transfer>> {
        Ok(self
            .read_json(&self.record_path(TRANSFERS_DIR, key))?
            .unwrap_or_default())
    }

    /// Staged ledger for a key, read from disk on first touch
    fn ledger_entry<'a>(
        &self,
        ledgers: &'a mut BTreeMap<ItemKey, Vec<Transfer>>,
        key: &ItemKey,
    ) -> Result<&'a mut Vec<Transfer>> {
        match ledgers.entry(key.clone()) {
            std::collections::btree_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::btree_map::Entry::Vacant(entry) => {
                let loaded = self.load_ledger(key)?;
                Ok(entry.insert(loaded))
            }
        }
    }
}

/// Planned effect on one record file
enum Planned {
    Write(serde_json::Value),
    Delete,
}

#[async_trait]
impl WorkItemStore for FileStore {
    async fn work_item(&self, key: &ItemKey) -> Result<Option<WorkItem>> {
        self.read_json(&self.record_path(ITEMS_DIR, key))
    }

    async fn location(&self, key: &ItemKey) -> Result<Option<Location>> {
        self.read_json(&self.record_path(LOCATIONS_DIR, key))
    }

    async fn outbox(&self, key: &ItemKey) -> Result<Option<Outbox>> {
        self.read_json(&self.record_path(OUTBOX_DIR, key))
    }

    async fn pending_transfer(&self, key: &ItemKey) -> Result<Option<Transfer>> {
        Ok(self
            .load_ledger(key)?
            .into_iter()
            .find(Transfer::is_pending))
    }

    async fn transfers(&self, key: &ItemKey) -> Result<Vec<Transfer>> {
        self.load_ledger(key)
    }

    async fn children_of(&self, batch_id: &EntityId) -> Result<Vec<WorkItem>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(self.root_path.join(ITEMS_DIR))? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Some(item) = self.read_json::<WorkItem>(&path)? {
                if item.entity_type == EntityType::ForeignUrgent && item.batch_id == *batch_id {
                    children.push(item);
                }
            }
        }
        children.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(children)
    }

    async fn apply(&self, batch: TransitionBatch) -> Result<()> {
        let _guard = self.write_lock.lock().expect("file store lock poisoned");

        // Stage: fold mutations into per-file plans, loading transfer
        // ledgers once per key so in-batch sequences compose.
        let mut plan: BTreeMap<PathBuf, Planned> = BTreeMap::new();
        let mut ledgers: BTreeMap<ItemKey, Vec<Transfer>> = BTreeMap::new();

        for mutation in batch.mutations() {
            match mutation.clone() {
                Mutation::PutWorkItem(item) => {
                    plan.insert(
                        self.record_path(ITEMS_DIR, &item.key()),
                        Planned::Write(serde_json::to_value(&item)?),
                    );
                }
                Mutation::PutLocation(key, location) => {
                    plan.insert(
                        self.record_path(LOCATIONS_DIR, &key),
                        Planned::Write(serde_json::to_value(&location)?),
                    );
                }
                Mutation::DeleteLocation(key) => {
                    plan.insert(self.record_path(LOCATIONS_DIR, &key), Planned::Delete);
                }
                Mutation::PutOutbox(key, outbox) => {
                    plan.insert(
                        self.record_path(OUTBOX_DIR, &key),
                        Planned::Write(serde_json::to_value(&outbox)?),
                    );
                }
                Mutation::DeleteOutbox(key) => {
                    plan.insert(self.record_path(OUTBOX_DIR, &key), Planned::Delete);
                }
                Mutation::InsertTransfer(key, transfer) => {
                    self.ledger_entry(&mut ledgers, &key)?.push(transfer);
                }
                Mutation::UpdateTransfer(key, transfer) => {
                    let ledger = self.ledger_entry(&mut ledgers, &key)?;
                    let row = ledger
                        .iter_mut()
                        .find(|t| t.transfer_id == transfer.transfer_id)
                        .ok_or_else(|| transfer_not_found(&key, &transfer.transfer_id))?;
                    *row = transfer;
                }
                Mutation::DeletePendingTransfer(key) => {
                    self.ledger_entry(&mut ledgers, &key)?
                        .retain(|t| !t.is_pending());
                }
            }
        }
        for (key, ledger) in &ledgers {
            plan.insert(
                self.record_path(TRANSFERS_DIR, key),
                Planned::Write(serde_json::to_value(ledger)?),
            );
        }

        // Write all temp files before the first rename
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (path, planned) in &plan {
            if let Planned::Write(value) = planned {
                let tmp = path.with_extension("json.tmp");
                let json = serde_json::to_string_pretty(value)?;
                if let Err(e) = fs::write(&tmp, json) {
                    for (tmp, _) in &staged {
                        let _ = fs::remove_file(tmp);
                    }
                    return Err(TrackError::Storage(format!(
                        "failed to stage {}: {}",
                        path.display(),
                        e
                    )));
                }
                staged.push((tmp, path.clone()));
            }
        }

        // Commit: renames first, deletions last
        for (tmp, path) in staged {
            fs::rename(&tmp, &path)?;
        }
        for (path, planned) in &plan {
            if matches!(planned, Planned::Delete) && path.exists() {
                fs::remove_file(path)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileStore {
    async fn append_event(&self, event: &LogEvent) -> Result<()> {
        let _guard = self.write_lock.lock().expect("file store lock poisoned");
        let line = serde_json::to_string(event)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    async fn read_events(&self) -> Result<Vec<LogEvent>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let content = fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let event = serde_json::from_str(line).map_err(|e| {
                TrackError::Serialization(format!("corrupt audit log line: {}", e))
            })?;
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchtrack_types::{Department, EventType, UserId, WorkItemStatus};
    use crate::types::BatchAttributes;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn records_round_trip_through_files() {
        let (_dir, store) = store();
        let item = WorkItem::new_batch(5, 2, BatchAttributes::default(), Some(UserId::new(9)));
        let key = item.key();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(item.clone()));
        batch.push(Mutation::PutLocation(
            key.clone(),
            Location::reception_draft(Some(UserId::new(9))),
        ));
        batch.push(Mutation::InsertTransfer(
            key.clone(),
            Transfer::pending(
                Department::Reception,
                Department::Billing,
                WorkItemStatus::Inbox,
                None,
            ),
        ));
        store.apply(batch).await.unwrap();

        assert_eq!(store.work_item(&key).await.unwrap().unwrap(), item);
        assert_eq!(
            store.location(&key).await.unwrap().unwrap().department,
            Department::Reception
        );
        assert!(store.pending_transfer(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn supersede_and_insert_compose_in_one_batch() {
        let (_dir, store) = store();
        let item = WorkItem::new_batch(5, 2, BatchAttributes::default(), None);
        let key = item.key();

        let first = Transfer::pending(
            Department::Reception,
            Department::Admittance,
            WorkItemStatus::Inbox,
            None,
        );
        let mut batch = TransitionBatch::new();
        batch.push(Mutation::InsertTransfer(key.clone(), first));
        store.apply(batch).await.unwrap();

        let second = Transfer::pending(
            Department::Reception,
            Department::Billing,
            WorkItemStatus::Inbox,
            None,
        );
        let mut batch = TransitionBatch::new();
        batch.push(Mutation::DeletePendingTransfer(key.clone()));
        batch.push(Mutation::InsertTransfer(key.clone(), second.clone()));
        store.apply(batch).await.unwrap();

        let ledger = store.transfers(&key).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].transfer_id, second.transfer_id);
    }

    #[tokio::test]
    async fn update_of_missing_transfer_fails_without_side_effects() {
        let (_dir, store) = store();
        let item = WorkItem::new_batch(5, 2, BatchAttributes::default(), None);
        let key = item.key();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(item));
        batch.push(Mutation::UpdateTransfer(
            key.clone(),
            Transfer::pending(
                Department::Reception,
                Department::Billing,
                WorkItemStatus::Inbox,
                None,
            ),
        ));

        assert!(store.apply(batch).await.is_err());
        assert!(store.work_item(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn audit_log_appends_json_lines() {
        let (_dir, store) = store();
        let item = WorkItem::new_batch(3, 0, BatchAttributes::default(), None);
        let event = LogEvent::for_item(
            EventType::BatchCreated,
            Department::Reception,
            &item,
            None,
        );
        store.append_event(&event).await.unwrap();
        store.append_event(&event).await.unwrap();

        let events = store.read_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::BatchCreated);
        assert_eq!(events[0].entity_id, item.entity_id);
    }
}
