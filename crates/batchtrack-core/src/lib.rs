//! Batchtrack Core Library
//!
//! Workflow transfer state machine and diff-based audit logging for
//! batches of billing paperwork moving between back-office departments.

pub mod audit;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;
pub mod workflow;

// Re-export main types for easy access
pub use config::TrackConfig;
pub use error::{Result, TrackError};

// Re-export storage types
pub use storage::{
    file::FileStore, memory::MemoryStore, Mutation, TransitionBatch, WorkItemStore,
};

// Re-export broadcast types
pub use broadcast::{BroadcastEvent, Broadcaster, ChannelBroadcaster, NullBroadcaster};

// Re-export audit types
pub use audit::{
    diff::{diff_snapshots, ChangeMap, FieldChange, Snapshot},
    AuditSink, AuditTrail, LogEvent,
};

// Re-export workflow types
pub use workflow::{
    resolve_destination, CreatedBatch, MoveOutcome, UpdateOutcome, WorkItemDetail,
    WorkflowEngine,
};

pub use types::{
    BatchAttributes, CreateBatchRequest, ForeignUrgentChild, Location, Outbox, Transfer,
    UpdatePatch, WorkItem,
};
