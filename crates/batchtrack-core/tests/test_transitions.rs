//! End-to-end workflow transition tests over the in-memory store

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batchtrack_core::{
    AuditSink, BatchAttributes, BroadcastEvent, Broadcaster, CreateBatchRequest,
    ForeignUrgentChild, LogEvent, MemoryStore, Result, TrackError, UpdatePatch,
    WorkItemStore, WorkflowEngine,
};
use batchtrack_types::{
    AcceptStatus, BroadcastEventName, Department, Destination, EntityType, EventType, UserId,
    WorkItemStatus,
};

/// Broadcaster that records every publish for assertions
#[derive(Default)]
struct RecordingBroadcaster {
    published: Mutex<Vec<(Department, BroadcastEvent)>>,
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish(&self, channel: Department, event: BroadcastEvent) -> Result<()> {
        self.published.lock().unwrap().push((channel, event));
        Ok(())
    }
}

impl RecordingBroadcaster {
    fn published(&self) -> Vec<(Department, BroadcastEvent)> {
        self.published.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

type Engine = WorkflowEngine<MemoryStore, RecordingBroadcaster, MemoryStore>;

fn engine() -> (Arc<MemoryStore>, Arc<RecordingBroadcaster>, Engine) {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let engine = WorkflowEngine::new(store.clone(), broadcaster.clone(), store.clone());
    (store, broadcaster, engine)
}

fn request(batch_size: u32, total_foreign_urgent: u32, children: usize) -> CreateBatchRequest {
    CreateBatchRequest {
        batch_size,
        total_foreign_urgent,
        attributes: BatchAttributes {
            batch_number: Some("B-100".to_string()),
            notes: Some("initial".to_string()),
            ..BatchAttributes::default()
        },
        children: (0..children).map(|_| ForeignUrgentChild::default()).collect(),
    }
}

fn user() -> Option<UserId> {
    Some(UserId::new(42))
}

async fn event_types(store: &MemoryStore) -> Vec<(EventType, Department)> {
    store
        .read_events()
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.event_type, e.department))
        .collect()
}

#[tokio::test]
async fn create_places_batch_and_children_in_reception() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 2, 2), user()).await.unwrap();

    assert!(!created.batch.is_pure_foreign_urgent);
    assert_eq!(created.children.len(), 2);

    let parent_location = store.location(&created.batch.key()).await.unwrap().unwrap();
    assert_eq!(parent_location.department, Department::Reception);
    assert_eq!(parent_location.status, WorkItemStatus::Current);
    for child in &created.children {
        assert_eq!(child.entity_type, EntityType::ForeignUrgent);
        assert_eq!(child.batch_id, created.batch.entity_id);
        let location = store.location(&child.key()).await.unwrap().unwrap();
        assert_eq!(location.department, Department::Reception);
        assert_eq!(location.status, WorkItemStatus::Current);
    }

    let published = broadcaster.published();
    assert_eq!(published.len(), 3);
    assert!(published
        .iter()
        .all(|(d, e)| *d == Department::Reception && e.name == BroadcastEventName::BatchCreated));

    assert_eq!(
        event_types(&store).await,
        vec![
            (EventType::BatchCreated, Department::Reception),
            (EventType::ForeignUrgentCreated, Department::Reception),
            (EventType::ForeignUrgentCreated, Department::Reception),
        ]
    );
}

#[tokio::test]
async fn pure_foreign_urgent_parent_is_not_logged() {
    let (store, _, engine) = engine();
    let created = engine.create_batch(request(5, 5, 2), user()).await.unwrap();

    assert!(created.batch.is_pure_foreign_urgent);
    let events = event_types(&store).await;
    assert_eq!(
        events,
        vec![
            (EventType::ForeignUrgentCreated, Department::Reception),
            (EventType::ForeignUrgentCreated, Department::Reception),
        ]
    );
}

#[tokio::test]
async fn oversized_foreign_urgent_count_rejected_before_any_mutation() {
    let (store, broadcaster, engine) = engine();
    let result = engine.create_batch(request(10, 12, 0), user()).await;

    assert!(matches!(result, Err(TrackError::Validation(_))));
    assert!(broadcaster.published().is_empty());
    assert!(store.read_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn move_to_billing_updates_all_three_rows() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    broadcaster.clear();

    let outcome = engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();

    let location = store.location(&key).await.unwrap().unwrap();
    assert_eq!(location.department, Department::Billing);
    assert_eq!(location.status, WorkItemStatus::Inbox);

    let outbox = store.outbox(&key).await.unwrap().unwrap();
    assert_eq!(outbox.department, Department::Reception);

    let pending = store.pending_transfer(&key).await.unwrap().unwrap();
    assert_eq!(pending.from_department, Department::Reception);
    assert_eq!(pending.to_department, Department::Billing);
    assert_eq!(pending.target_status, WorkItemStatus::Inbox);

    // The admitted marker is stamped when entering billing
    let item = store.work_item(&key).await.unwrap().unwrap();
    assert!(item.admitted_at.is_some());
    assert_eq!(item.admitted_by, user());

    assert_eq!(outcome.inbox_view.current_department, Department::Billing);
    assert_eq!(outcome.inbox_view.status, WorkItemStatus::Inbox);
    assert_eq!(
        outcome.outbox_view.transfer_from_department,
        Some(Department::Reception)
    );
    assert_eq!(
        outcome.outbox_view.transfer_to_department,
        Some(Department::Billing)
    );

    let published = broadcaster.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, Department::Reception);
    assert_eq!(published[1].0, Department::Billing);
    assert!(published
        .iter()
        .all(|(_, e)| e.name == BroadcastEventName::BatchUpdated));

    let events = event_types(&store).await;
    assert_eq!(
        &events[1..],
        &[
            (EventType::BatchSent, Department::Reception),
            (EventType::BatchReceived, Department::Billing),
        ]
    );
}

#[tokio::test]
async fn move_to_filing_parks_in_reception() {
    let (store, _, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();

    engine
        .move_work_item(&key, Destination::Filing, user())
        .await
        .unwrap();

    let location = store.location(&key).await.unwrap().unwrap();
    assert_eq!(location.department, Department::Reception);
    assert_eq!(location.status, WorkItemStatus::Filing);

    let pending = store.pending_transfer(&key).await.unwrap().unwrap();
    assert_eq!(pending.target_status, WorkItemStatus::Filing);

    // The billed marker is stamped when sent to filing
    let item = store.work_item(&key).await.unwrap().unwrap();
    assert!(item.billed_at.is_some());

    let events = event_types(&store).await;
    assert_eq!(
        &events[1..],
        &[
            (EventType::BatchSent, Department::Reception),
            (EventType::BatchToFiling, Department::Reception),
        ]
    );
}

#[tokio::test]
async fn second_move_supersedes_pending_transfer() {
    let (store, _, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();

    engine
        .move_work_item(&key, Destination::Admittance, user())
        .await
        .unwrap();
    engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();

    let ledger = store.transfers(&key).await.unwrap();
    assert_eq!(ledger.len(), 1);
    let pending = store.pending_transfer(&key).await.unwrap().unwrap();
    assert_eq!(pending.to_department, Department::Billing);
    assert_eq!(pending.from_department, Department::Admittance);
}

#[tokio::test]
async fn accept_settles_item_and_closes_outbox() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();
    broadcaster.clear();

    let view = engine.accept_work_item(&key, user(), None).await.unwrap();

    assert_eq!(view.current_department, Department::Billing);
    assert_eq!(view.status, WorkItemStatus::Current);

    let location = store.location(&key).await.unwrap().unwrap();
    assert_eq!(location.status, WorkItemStatus::Current);
    assert!(store.outbox(&key).await.unwrap().is_none());

    // The ledger row survives acceptance, marked but not deleted
    let ledger = store.transfers(&key).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(!ledger[0].is_pending());
    assert_eq!(ledger[0].accepted_by, user());
    assert!(store.pending_transfer(&key).await.unwrap().is_none());

    // Acceptance notifies the accepting department and the sender
    let published = broadcaster.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, Department::Billing);
    assert_eq!(published[1].0, Department::Reception);

    let events = event_types(&store).await;
    assert_eq!(
        &events[3..],
        &[
            (EventType::BatchAccepted, Department::Billing),
            (EventType::BatchAcceptedDownstream, Department::Reception),
        ]
    );
}

#[tokio::test]
async fn accept_without_outbox_emits_no_downstream_log() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    broadcaster.clear();

    let view = engine.accept_work_item(&key, user(), None).await.unwrap();
    assert_eq!(view.status, WorkItemStatus::Current);

    assert_eq!(broadcaster.published().len(), 1);
    let events = event_types(&store).await;
    assert_eq!(&events[1..], &[(EventType::BatchAccepted, Department::Reception)]);
}

#[tokio::test]
async fn accept_with_filing_hint_settles_to_filing() {
    let (store, _, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    engine
        .move_work_item(&key, Destination::Filing, user())
        .await
        .unwrap();

    let view = engine
        .accept_work_item(&key, user(), Some(AcceptStatus::Filing))
        .await
        .unwrap();
    assert_eq!(view.status, WorkItemStatus::Filing);
    let location = store.location(&key).await.unwrap().unwrap();
    assert_eq!(location.status, WorkItemStatus::Filing);
    assert_eq!(location.department, Department::Reception);
}

#[tokio::test]
async fn cancel_restores_pre_move_state_but_keeps_ledger() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();
    broadcaster.clear();

    let view = engine.cancel_transfer(&key, user()).await.unwrap();

    assert_eq!(view.current_department, Department::Reception);
    assert_eq!(view.status, WorkItemStatus::Current);

    let location = store.location(&key).await.unwrap().unwrap();
    assert_eq!(location.department, Department::Reception);
    assert_eq!(location.status, WorkItemStatus::Current);
    assert!(store.outbox(&key).await.unwrap().is_none());

    // The move attempt stays on the ledger
    assert_eq!(store.transfers(&key).await.unwrap().len(), 1);

    let published = broadcaster.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, Department::Reception);
    assert_eq!(published[1].0, Department::Billing);

    let events = event_types(&store).await;
    assert_eq!(
        &events[3..],
        &[
            (EventType::TransferCancelled, Department::Reception),
            (EventType::TransferCancelledRemote, Department::Billing),
        ]
    );
}

#[tokio::test]
async fn cancel_without_outbox_is_not_found() {
    let (_, _, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();

    let result = engine.cancel_transfer(&key, user()).await;
    assert!(matches!(result, Err(TrackError::NotFound(_))));
}

#[tokio::test]
async fn archive_is_terminal() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    broadcaster.clear();

    let view = engine.archive_work_item(&key, user()).await.unwrap();
    assert_eq!(view.status, WorkItemStatus::Archived);
    assert_eq!(view.current_department, Department::Reception);

    assert!(store.location(&key).await.unwrap().is_none());
    let item = store.work_item(&key).await.unwrap().unwrap();
    assert!(item.archived);
    assert_eq!(item.filed_by, user());
    assert!(item.filed_at.is_some());

    // No location left, so no further transition applies
    let result = engine.move_work_item(&key, Destination::Billing, user()).await;
    assert!(matches!(result, Err(TrackError::NotFound(_))));
    let result = engine.archive_work_item(&key, user()).await;
    assert!(matches!(result, Err(TrackError::NotFound(_))));
}

#[tokio::test]
async fn archive_message_distinguishes_unmoved_drafts() {
    let (store, _, engine) = engine();

    let draft = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    engine
        .archive_work_item(&draft.batch.key(), user())
        .await
        .unwrap();

    let moved = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let moved_key = moved.batch.key();
    engine
        .move_work_item(&moved_key, Destination::Billing, user())
        .await
        .unwrap();
    engine.accept_work_item(&moved_key, user(), None).await.unwrap();
    engine.archive_work_item(&moved_key, user()).await.unwrap();

    let events = store.read_events().await.unwrap();
    let archive_messages: Vec<String> = events
        .iter()
        .filter(|e| e.event_type == EventType::BatchArchived)
        .map(|e| e.metadata["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(archive_messages.len(), 2);
    assert_eq!(archive_messages[0], "Archived before leaving reception");
    assert_eq!(archive_messages[1], "Archived from current status");
}

#[tokio::test]
async fn update_with_identical_values_changes_nothing() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    broadcaster.clear();

    let patch = UpdatePatch {
        notes: Some("initial".to_string()),
        batch_number: Some("B-100".to_string()),
        ..UpdatePatch::default()
    };
    let outcome = engine
        .update_work_item_fields(&key, patch, user())
        .await
        .unwrap();

    assert_eq!(outcome.updated, created.batch);
    assert!(broadcaster.published().is_empty());
    let events = event_types(&store).await;
    assert!(!events.iter().any(|(t, _)| *t == EventType::BatchUpdated));
}

#[tokio::test]
async fn update_logs_diff_and_mirrors_children() {
    let (store, broadcaster, engine) = engine();
    let created = engine.create_batch(request(5, 1, 1), user()).await.unwrap();
    let parent_key = created.batch.key();
    let child_key = created.children[0].key();

    // Park the child in admittance so its broadcast goes to its own
    // department, not the parent's
    engine
        .move_work_item(&child_key, Destination::Admittance, user())
        .await
        .unwrap();
    engine.accept_work_item(&child_key, user(), None).await.unwrap();
    broadcaster.clear();

    let patch = UpdatePatch {
        notes: Some("rebilled".to_string()),
        ..UpdatePatch::default()
    };
    let outcome = engine
        .update_work_item_fields(&parent_key, patch, user())
        .await
        .unwrap();

    assert_eq!(outcome.updated.attributes.notes.as_deref(), Some("rebilled"));
    assert_eq!(outcome.children.len(), 1);
    assert_eq!(
        outcome.children[0].attributes.notes.as_deref(),
        Some("rebilled")
    );

    let stored_child = store.work_item(&child_key).await.unwrap().unwrap();
    assert_eq!(stored_child.attributes.notes.as_deref(), Some("rebilled"));

    let published = broadcaster.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].0, Department::Reception);
    assert_eq!(published[1].0, Department::Admittance);

    let events = store.read_events().await.unwrap();
    let updated: Vec<&LogEvent> = events
        .iter()
        .filter(|e| e.event_type == EventType::BatchUpdated)
        .collect();
    assert_eq!(updated.len(), 1);
    let change = &updated[0].changes["details.notes"];
    assert_eq!(change.before, serde_json::json!("initial"));
    assert_eq!(change.after, serde_json::json!("rebilled"));
}

#[tokio::test]
async fn update_recomputes_pure_foreign_urgent_flag() {
    let (_, _, engine) = engine();
    let created = engine.create_batch(request(5, 3, 0), user()).await.unwrap();
    let key = created.batch.key();

    let patch = UpdatePatch {
        total_foreign_urgent: Some(5),
        ..UpdatePatch::default()
    };
    let outcome = engine
        .update_work_item_fields(&key, patch, user())
        .await
        .unwrap();
    assert!(outcome.updated.is_pure_foreign_urgent);

    let patch = UpdatePatch {
        total_foreign_urgent: Some(9),
        ..UpdatePatch::default()
    };
    assert!(matches!(
        engine.update_work_item_fields(&key, patch, user()).await,
        Err(TrackError::Validation(_))
    ));
}

#[tokio::test]
async fn update_rejects_items_not_settled_in_a_department() {
    let (_, _, engine) = engine();
    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();

    let patch = UpdatePatch {
        notes: Some("while moving".to_string()),
        ..UpdatePatch::default()
    };
    assert!(matches!(
        engine.update_work_item_fields(&key, patch, user()).await,
        Err(TrackError::Conflict(_))
    ));
}

#[tokio::test]
async fn audit_sink_failure_never_fails_the_operation() {
    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn append_event(&self, _event: &LogEvent) -> Result<()> {
            Err(TrackError::Logging("audit store offline".to_string()))
        }

        async fn read_events(&self) -> Result<Vec<LogEvent>> {
            Ok(vec![])
        }
    }

    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let engine = WorkflowEngine::new(store.clone(), broadcaster, Arc::new(FailingSink));

    let created = engine.create_batch(request(5, 0, 0), user()).await.unwrap();
    let key = created.batch.key();
    engine
        .move_work_item(&key, Destination::Billing, user())
        .await
        .unwrap();
    engine.accept_work_item(&key, user(), None).await.unwrap();
    engine.archive_work_item(&key, user()).await.unwrap();

    let item = store.work_item(&key).await.unwrap().unwrap();
    assert!(item.archived);
}
