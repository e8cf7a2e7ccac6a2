//! Guarded pipeline state machine shared by the request and response workflows.
//!
//! A [`PipelineDefinition`] holds the static tables, [`evaluate`] and [`next_states`]
//! are pure decisions over it, and [`PipelineService`] wires them to a record store
//! and an audit sink.

mod backfill;
mod definition;
mod evaluator;
mod reachability;
pub mod record;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use backfill::{backfill, BackfillFailure, BackfillReport};
pub use definition::{DefinitionError, PipelineBuilder, PipelineDefinition, PipelineStage};
pub use evaluator::{evaluate, RejectionReason, TransitionDecision};
pub use reachability::next_states;
pub use record::{
    AuditError, AuditEvent, AuditSink, EntityId, PipelineRecord, PipelineRepository,
    PipelineSnapshot, RecordUpdate, RepositoryError, ResolvedPosition, StoredStage,
};
pub use router::pipeline_router;
pub use service::{PipelineService, PipelineServiceError};
