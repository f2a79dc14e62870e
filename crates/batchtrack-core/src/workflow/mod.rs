//! Workflow state machine modules

pub mod destination;
pub mod orchestrator;

pub use destination::resolve_destination;
pub use orchestrator::{
    CreatedBatch, MoveOutcome, UpdateOutcome, WorkItemDetail, WorkflowEngine,
};
