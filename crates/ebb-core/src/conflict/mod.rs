//! Three-way conflict detection and resolution.
//!
//! A replayed write that hits a stale version is compared field by field
//! against the snapshot it was based on:
//!
//! - **base**: what the client last saw from the server
//! - **server**: what the server holds now
//! - **client**: base with the write's changes applied
//!
//! Edits touching disjoint fields are merged without policy input. Edits that
//! touch the same field go through the configured [`ConflictStrategy`].

mod engine;
mod strategy;

use std::collections::BTreeSet;

use crate::models::{changed_fields, Entity, EntityRef, Fields};

pub use engine::{ConflictEngine, Resolution};
pub use strategy::{ClientWins, ConflictStrategy, ServerWins, StrategyError};

/// The three snapshots of one entity compared during a resolution round
///
/// Built per replay and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    pub entity: EntityRef,
    pub base: Entity,
    pub server: Entity,
    pub client: Entity,
}

impl ConflictContext {
    pub fn new(base: Entity, server: Entity, client: Entity) -> Self {
        Self {
            entity: server.reference.clone(),
            base,
            server,
            client,
        }
    }

    /// Fields the server changed relative to base
    pub fn server_changes(&self) -> BTreeSet<String> {
        changed_fields(&self.base.fields, &self.server.fields)
    }

    /// Fields the client changed relative to base
    pub fn client_changes(&self) -> BTreeSet<String> {
        changed_fields(&self.base.fields, &self.client.fields)
    }

    /// Fields both sides changed
    pub fn overlapping_fields(&self) -> Vec<String> {
        self.server_changes()
            .intersection(&self.client_changes())
            .cloned()
            .collect()
    }

    /// No field was touched by both sides
    pub fn is_mergeable(&self) -> bool {
        self.server_changes().is_disjoint(&self.client_changes())
    }

    /// Server state with every client-changed field written over it
    ///
    /// A field the client removed is removed from the result.
    pub fn client_overlay(&self) -> Fields {
        let mut resolved = self.server.fields.clone();
        for key in self.client_changes() {
            match self.client.fields.get(&key) {
                Some(value) => {
                    resolved.insert(key, value.clone());
                }
                None => {
                    resolved.remove(&key);
                }
            }
        }
        resolved
    }
}

/// Observer for resolution events; every method defaults to a no-op
pub trait ConflictListener: Send + Sync {
    /// Overlapping edits were handed to the strategy
    fn conflict_occurred(&self, _context: &ConflictContext) {}

    /// Disjoint edits were merged automatically
    fn merge_occurred(&self, _context: &ConflictContext) {}
}
