//! Workflow transfer state machine
//!
//! Each operation is one request-scoped unit of work: validate, read
//! current state, commit a single [`TransitionBatch`], then fire the
//! broadcast and audit-log side effects. Side effects run only after
//! the commit and never fail the operation.

use std::sync::Arc;

use batchtrack_types::{
    AcceptStatus, Department, Destination, EventType, ItemKey, UserId, WorkItemStatus,
    WorkItemView,
};
use chrono::Utc;
use serde::Serialize;

use super::destination::resolve_destination;
use crate::audit::diff::{diff_snapshots, Snapshot};
use crate::audit::{AuditSink, AuditTrail, LogEvent};
use crate::broadcast::{BroadcastEvent, Broadcaster};
use crate::error::{Result, TrackError};
use crate::storage::{Mutation, TransitionBatch, WorkItemStore};
use crate::types::{CreateBatchRequest, Location, Outbox, Transfer, UpdatePatch, WorkItem};

/// Result of creating a batch with its attached foreign/urgent cases
#[derive(Debug, Clone, Serialize)]
pub struct CreatedBatch {
    pub batch: WorkItem,
    pub children: Vec<WorkItem>,
}

/// The two views published by a move: the sender's outbox view and the
/// receiver's inbox view
#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub outbox_view: WorkItemView,
    pub inbox_view: WorkItemView,
}

/// Result of a field update, with the sub-cases that mirrored the patch
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub updated: WorkItem,
    pub children: Vec<WorkItem>,
}

/// Read-only aggregate of one work item's workflow rows
#[derive(Debug, Clone, Serialize)]
pub struct WorkItemDetail {
    pub item: WorkItem,
    pub location: Option<Location>,
    pub outbox: Option<Outbox>,
    pub pending_transfer: Option<Transfer>,
}

/// Single orchestration component for workflow transitions
pub struct WorkflowEngine<S, B, A>
where
    S: WorkItemStore,
    B: Broadcaster,
    A: AuditSink,
{
    store: Arc<S>,
    broadcaster: Arc<B>,
    audit: AuditTrail<A>,
}

impl<S, B, A> WorkflowEngine<S, B, A>
where
    S: WorkItemStore,
    B: Broadcaster,
    A: AuditSink,
{
    pub fn new(store: Arc<S>, broadcaster: Arc<B>, audit_sink: Arc<A>) -> Self {
        Self {
            store,
            broadcaster,
            audit: AuditTrail::new(audit_sink),
        }
    }

    /// Create a batch and its attached foreign/urgent cases, all landing
    /// as current drafts in reception
    pub async fn create_batch(
        &self,
        request: CreateBatchRequest,
        created_by: Option<UserId>,
    ) -> Result<CreatedBatch> {
        request.validate()?;

        let batch_item = WorkItem::new_batch(
            request.batch_size,
            request.total_foreign_urgent,
            request.attributes.clone(),
            created_by,
        );
        let children: Vec<WorkItem> = request
            .children
            .iter()
            .map(|child| {
                WorkItem::new_foreign_urgent(
                    batch_item.batch_id.clone(),
                    child.attributes.clone(),
                    created_by,
                )
            })
            .collect();

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutWorkItem(batch_item.clone()));
        batch.push(Mutation::PutLocation(
            batch_item.key(),
            Location::reception_draft(created_by),
        ));
        for child in &children {
            batch.push(Mutation::PutWorkItem(child.clone()));
            batch.push(Mutation::PutLocation(
                child.key(),
                Location::reception_draft(created_by),
            ));
        }
        self.store.apply(batch).await?;

        log::info!(
            "Created batch {} with {} foreign/urgent cases",
            batch_item.entity_id,
            children.len()
        );

        for item in std::iter::once(&batch_item).chain(children.iter()) {
            let view = Self::view(
                item,
                Department::Reception,
                WorkItemStatus::Current,
                None,
            );
            self.publish(Department::Reception, BroadcastEvent::created(view))
                .await;
        }

        // A pure foreign/urgent parent is a bookkeeping shell; only its
        // children show up in the audit trail.
        if !batch_item.is_pure_foreign_urgent {
            let changes = diff_snapshots(&Snapshot::new(), &batch_item.snapshot());
            self.audit
                .record(
                    LogEvent::for_item(
                        EventType::BatchCreated,
                        Department::Reception,
                        &batch_item,
                        created_by,
                    )
                    .with_changes(changes),
                )
                .await;
        }
        for child in &children {
            let changes = diff_snapshots(&Snapshot::new(), &child.snapshot());
            self.audit
                .record(
                    LogEvent::for_item(
                        EventType::ForeignUrgentCreated,
                        Department::Reception,
                        child,
                        created_by,
                    )
                    .with_changes(changes),
                )
                .await;
        }

        Ok(CreatedBatch {
            batch: batch_item,
            children,
        })
    }

    /// Send a work item to another department (or to filing)
    pub async fn move_work_item(
        &self,
        key: &ItemKey,
        to: Destination,
        user_id: Option<UserId>,
    ) -> Result<MoveOutcome> {
        let mut item = self.require_item(key).await?;
        let location = self.require_location(key).await?;
        let from_department = location.department;
        let (to_department, target_status) = resolve_destination(to);

        let now = Utc::now();
        let mut batch = TransitionBatch::new();

        match to {
            Destination::Billing => {
                item.admitted_by = user_id;
                item.admitted_at = Some(now);
                batch.push(Mutation::PutWorkItem(item.clone()));
            }
            Destination::Filing => {
                item.billed_by = user_id;
                item.billed_at = Some(now);
                batch.push(Mutation::PutWorkItem(item.clone()));
            }
            _ => {}
        }

        batch.push(Mutation::PutLocation(
            key.clone(),
            Location {
                department: to_department,
                status: target_status,
                created_by: location.created_by,
                updated_at: now,
            },
        ));
        batch.push(Mutation::PutOutbox(
            key.clone(),
            Outbox {
                department: from_department,
                created_by: user_id,
                created_at: now,
            },
        ));
        // A new move supersedes whatever transfer was still pending
        batch.push(Mutation::DeletePendingTransfer(key.clone()));
        let transfer = Transfer::pending(from_department, to_department, target_status, user_id);
        batch.push(Mutation::InsertTransfer(key.clone(), transfer.clone()));
        self.store.apply(batch).await?;

        log::info!(
            "Moved {} from {} to {} ({})",
            key,
            from_department,
            to_department,
            target_status
        );

        let view = Self::view(&item, to_department, target_status, Some(&transfer));
        self.publish(from_department, BroadcastEvent::updated(view.clone()))
            .await;
        self.publish(to_department, BroadcastEvent::updated(view.clone()))
            .await;

        self.audit
            .record(
                LogEvent::for_item(EventType::BatchSent, from_department, &item, user_id)
                    .with_metadata("to_department", serde_json::json!(to_department)),
            )
            .await;
        let arrival = if to == Destination::Filing {
            EventType::BatchToFiling
        } else {
            EventType::BatchReceived
        };
        self.audit
            .record(
                LogEvent::for_item(arrival, to_department, &item, user_id)
                    .with_metadata("from_department", serde_json::json!(from_department)),
            )
            .await;

        Ok(MoveOutcome {
            outbox_view: view.clone(),
            inbox_view: view,
        })
    }

    /// Accept a work item in its current department, settling it to
    /// current (or filing when hinted) and closing the in-flight marker
    pub async fn accept_work_item(
        &self,
        key: &ItemKey,
        user_id: Option<UserId>,
        status_hint: Option<AcceptStatus>,
    ) -> Result<WorkItemView> {
        let item = self.require_item(key).await?;
        let location = self.require_location(key).await?;
        let department = location.department;
        let status = match status_hint {
            Some(AcceptStatus::Filing) => WorkItemStatus::Filing,
            _ => WorkItemStatus::Current,
        };

        let now = Utc::now();
        let pending = self
            .store
            .pending_transfer(key)
            .await?
            .filter(|t| t.to_department == department);
        let outbox = self.store.outbox(key).await?;

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutLocation(
            key.clone(),
            Location {
                department,
                status,
                created_by: location.created_by,
                updated_at: now,
            },
        ));
        // The ledger row survives acceptance; it is marked, not deleted
        let accepted = pending.map(|mut transfer| {
            transfer.accepted_by = user_id;
            transfer.accepted_at = Some(now);
            transfer
        });
        if let Some(ref transfer) = accepted {
            batch.push(Mutation::UpdateTransfer(key.clone(), transfer.clone()));
        }
        if outbox.is_some() {
            batch.push(Mutation::DeleteOutbox(key.clone()));
        }
        self.store.apply(batch).await?;

        log::info!("Accepted {} at {} as {}", key, department, status);

        let view = Self::view(&item, department, status, accepted.as_ref());
        self.publish(department, BroadcastEvent::updated(view.clone()))
            .await;
        if let Some(ref outbox) = outbox {
            // The sender's outbox list drops the item
            self.publish(outbox.department, BroadcastEvent::updated(view.clone()))
                .await;
        }

        self.audit
            .record(LogEvent::for_item(
                EventType::BatchAccepted,
                department,
                &item,
                user_id,
            ))
            .await;
        if let Some(ref outbox) = outbox {
            self.audit
                .record(LogEvent::for_item(
                    EventType::BatchAcceptedDownstream,
                    outbox.department,
                    &item,
                    user_id,
                ))
                .await;
        }

        Ok(view)
    }

    /// Cancel an in-flight transfer, reverting the item to its origin
    /// department
    pub async fn cancel_transfer(
        &self,
        key: &ItemKey,
        user_id: Option<UserId>,
    ) -> Result<WorkItemView> {
        let item = self.require_item(key).await?;
        let outbox = self.store.outbox(key).await?.ok_or_else(|| {
            TrackError::NotFound(format!("no transfer in flight for {}", key))
        })?;
        let location = self.require_location(key).await?;
        let origin_department = outbox.department;
        let target_department = location.department;

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::PutLocation(
            key.clone(),
            Location {
                department: origin_department,
                status: WorkItemStatus::Current,
                created_by: location.created_by,
                updated_at: Utc::now(),
            },
        ));
        batch.push(Mutation::DeleteOutbox(key.clone()));
        // The pending ledger row is left untouched; the ledger keeps the
        // attempt.
        self.store.apply(batch).await?;

        log::info!(
            "Cancelled transfer of {}, reverted to {}",
            key,
            origin_department
        );

        let view = Self::view(
            &item,
            origin_department,
            WorkItemStatus::Current,
            None,
        );
        self.publish(origin_department, BroadcastEvent::updated(view.clone()))
            .await;
        if target_department != origin_department {
            self.publish(target_department, BroadcastEvent::updated(view.clone()))
                .await;
        }

        self.audit
            .record(LogEvent::for_item(
                EventType::TransferCancelled,
                origin_department,
                &item,
                user_id,
            ))
            .await;
        if target_department != origin_department {
            self.audit
                .record(LogEvent::for_item(
                    EventType::TransferCancelledRemote,
                    target_department,
                    &item,
                    user_id,
                ))
                .await;
        }

        Ok(view)
    }

    /// Archive a work item. Terminal: the location is gone and no
    /// further transitions apply.
    pub async fn archive_work_item(
        &self,
        key: &ItemKey,
        user_id: Option<UserId>,
    ) -> Result<WorkItemView> {
        let mut item = self.require_item(key).await?;
        let location = self.require_location(key).await?;

        let now = Utc::now();
        item.archived = true;
        item.filed_by = user_id;
        item.filed_at = Some(now);

        let mut batch = TransitionBatch::new();
        batch.push(Mutation::DeleteLocation(key.clone()));
        batch.push(Mutation::DeleteOutbox(key.clone()));
        batch.push(Mutation::PutWorkItem(item.clone()));
        self.store.apply(batch).await?;

        log::info!("Archived {} from {}", key, location.department);

        let view = Self::view(
            &item,
            location.department,
            WorkItemStatus::Archived,
            None,
        );
        self.publish(location.department, BroadcastEvent::updated(view.clone()))
            .await;

        let message = if location.department == Department::Reception
            && location.status == WorkItemStatus::Current
        {
            "Archived before leaving reception".to_string()
        } else {
            format!("Archived from {} status", location.status)
        };
        self.audit
            .record(
                LogEvent::for_item(
                    EventType::BatchArchived,
                    location.department,
                    &item,
                    user_id,
                )
                .with_message(message),
            )
            .await;

        Ok(view)
    }

    /// Patch the editable fields of a settled work item, mirroring the
    /// attribute changes onto the batch's foreign/urgent cases
    pub async fn update_work_item_fields(
        &self,
        key: &ItemKey,
        patch: UpdatePatch,
        user_id: Option<UserId>,
    ) -> Result<UpdateOutcome> {
        let item = self.require_item(key).await?;
        let location = self.require_location(key).await?;
        if location.status != WorkItemStatus::Current {
            return Err(TrackError::Conflict(format!(
                "{} is not editable while {}",
                key, location.status
            )));
        }
        if self.store.outbox(key).await?.is_some() {
            return Err(TrackError::Conflict(format!(
                "{} has a transfer in flight",
                key
            )));
        }

        let mut updated = item.clone();
        patch.apply_to_batch(&mut updated)?;
        let changes = diff_snapshots(&item.snapshot(), &updated.snapshot());

        let mut related = Vec::new();
        let mut changed_children = Vec::new();
        for child in self.store.children_of(&item.batch_id).await? {
            if child.key() == *key || child.archived {
                continue;
            }
            let mut patched = child.clone();
            patch.apply_attributes(&mut patched.attributes);
            if patched != child {
                changed_children.push(patched.clone());
            }
            related.push(patched);
        }

        if changes.is_empty() && changed_children.is_empty() {
            return Ok(UpdateOutcome {
                updated: item,
                children: related,
            });
        }

        let mut batch = TransitionBatch::new();
        if !changes.is_empty() {
            batch.push(Mutation::PutWorkItem(updated.clone()));
        }
        for child in &changed_children {
            batch.push(Mutation::PutWorkItem(child.clone()));
        }
        self.store.apply(batch).await?;

        log::info!(
            "Updated {} ({} changed fields, {} mirrored cases)",
            key,
            changes.len(),
            changed_children.len()
        );

        if !changes.is_empty() {
            let view = Self::view(&updated, location.department, location.status, None);
            self.publish(location.department, BroadcastEvent::updated(view))
                .await;
        }
        // Sub-cases may sit in other departments; each update goes to
        // the case's own channel
        for child in &changed_children {
            if let Some(child_location) = self.store.location(&child.key()).await? {
                let view = Self::view(
                    child,
                    child_location.department,
                    child_location.status,
                    None,
                );
                self.publish(child_location.department, BroadcastEvent::updated(view))
                    .await;
            }
        }

        if !changes.is_empty() {
            self.audit
                .record(
                    LogEvent::for_item(
                        EventType::BatchUpdated,
                        location.department,
                        &updated,
                        user_id,
                    )
                    .with_changes(changes),
                )
                .await;
        }

        Ok(UpdateOutcome {
            updated,
            children: related,
        })
    }

    /// Read one work item together with its workflow rows
    pub async fn work_item(&self, key: &ItemKey) -> Result<WorkItemDetail> {
        let item = self.require_item(key).await?;
        Ok(WorkItemDetail {
            location: self.store.location(key).await?,
            outbox: self.store.outbox(key).await?,
            pending_transfer: self.store.pending_transfer(key).await?,
            item,
        })
    }

    /// Full transfer ledger of one work item
    pub async fn transfer_history(&self, key: &ItemKey) -> Result<Vec<Transfer>> {
        self.require_item(key).await?;
        self.store.transfers(key).await
    }

    async fn require_item(&self, key: &ItemKey) -> Result<WorkItem> {
        self.store
            .work_item(key)
            .await?
            .ok_or_else(|| TrackError::NotFound(format!("work item {} does not exist", key)))
    }

    async fn require_location(&self, key: &ItemKey) -> Result<Location> {
        self.store
            .location(key)
            .await?
            .ok_or_else(|| TrackError::NotFound(format!("no active location for {}", key)))
    }

    async fn publish(&self, department: Department, event: BroadcastEvent) {
        if let Err(e) = self.broadcaster.publish(department, event).await {
            log::warn!("Failed to publish to {} channel: {}", department, e);
        }
    }

    fn view(
        item: &WorkItem,
        department: Department,
        status: WorkItemStatus,
        transfer: Option<&Transfer>,
    ) -> WorkItemView {
        WorkItemView {
            entity_type: item.entity_type,
            entity_id: item.entity_id.clone(),
            batch_id: item.batch_id.clone(),
            current_department: department,
            status,
            is_pure_foreign_urgent: item.is_pure_foreign_urgent,
            transfer_from_department: transfer.map(|t| t.from_department),
            transfer_to_department: transfer.map(|t| t.to_department),
        }
    }
}
