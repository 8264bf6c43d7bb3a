//! Queued operation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::entity::{Entity, EntityRef};
use super::mutation::Mutation;
use crate::error::Result;

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a queued operation is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for the next drain cycle
    Pending,
    /// Submitted, awaiting the transport
    InFlight,
    /// Diverged from the server, being resolved
    Conflicted,
    /// Accepted by the server
    Succeeded,
    /// Terminally rejected
    Failed,
}

impl OperationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Conflicted => "conflicted",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offline-issued mutation awaiting replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Stable across restarts
    pub id: OperationId,
    /// The write to replay
    pub mutation: Mutation,
    /// Last known server state of the target when the write was issued
    pub base: Option<Entity>,
    /// Lifecycle status
    pub status: OperationStatus,
    /// Logical sequence number; replay is FIFO per entity
    pub enqueued_at: u64,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Number of submissions made so far
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedOperation {
    /// Create a pending operation; the mutation must name an entity and a version
    pub fn new(mutation: Mutation, base: Option<Entity>, enqueued_at: u64) -> Result<Self> {
        mutation.validate()?;
        Ok(Self {
            id: OperationId::new(),
            mutation,
            base,
            status: OperationStatus::Pending,
            enqueued_at,
            created_at: chrono::Utc::now().timestamp_millis(),
            attempts: 0,
        })
    }

    /// Target entity
    pub fn entity_ref(&self) -> Result<EntityRef> {
        self.mutation.entity_ref()
    }

    /// Base snapshot, or an empty one at the mutation's version when never observed
    pub fn base_or_empty(&self) -> Result<Entity> {
        if let Some(base) = &self.base {
            return Ok(base.clone());
        }
        Ok(Entity::new(
            self.entity_ref()?,
            self.mutation.version()?,
            serde_json::Map::new(),
        ))
    }

    /// The locally intended result: base with the mutation's changes applied
    pub fn client_snapshot(&self) -> Result<Entity> {
        Ok(self.base_or_empty()?.overlaid(&self.mutation.changes()))
    }
}
