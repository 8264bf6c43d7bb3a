//! Data models for ebb

mod conflict_record;
mod entity;
mod mutation;
mod operation;

pub use conflict_record::{ConflictRecord, ResolutionKind};
pub use entity::{changed_fields, strip_reserved, Entity, EntityRef, Fields};
pub use mutation::{FetchPolicy, Mutation, Query};
pub use operation::{OperationId, OperationStatus, QueuedOperation};
