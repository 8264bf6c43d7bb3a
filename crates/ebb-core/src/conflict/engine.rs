//! Resolution rounds for a replayed write that hit a stale version

use std::sync::Arc;

use super::{ClientWins, ConflictContext, ConflictListener, ConflictStrategy};
use crate::error::{Error, Result};
use crate::models::{strip_reserved, Entity, Fields, QueuedOperation};
use crate::transport::{Transport, TransportError};

/// Default number of re-submissions before a conflict is reported as unresolvable
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Decision returned to the queue, which owns every status transition
#[derive(Debug)]
pub enum Resolution {
    /// The server accepted a resolved write; carries the authoritative entity
    Resolved(Entity),
    /// The network dropped mid-resolution; the operation goes back to pending
    Requeue(String),
    /// No resolution is possible
    Failed(Error),
}

/// Classifies diverged replays and drives resolved writes back to the server
pub struct ConflictEngine {
    strategy: Arc<dyn ConflictStrategy>,
    listener: Option<Arc<dyn ConflictListener>>,
    max_retries: u32,
}

impl Default for ConflictEngine {
    fn default() -> Self {
        Self::new(Arc::new(ClientWins), DEFAULT_MAX_CONFLICT_RETRIES)
    }
}

impl ConflictEngine {
    pub fn new(strategy: Arc<dyn ConflictStrategy>, max_retries: u32) -> Self {
        Self {
            strategy,
            listener: None,
            max_retries: max_retries.max(1),
        }
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ConflictListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Produce the resolved field set for one round
    ///
    /// Disjoint edits are merged, overlapping edits go to the strategy. Only
    /// a `report`ing round notifies the listener (`merge_occurred` or
    /// `conflict_occurred`).
    fn resolve(&self, context: &ConflictContext, report: bool) -> Result<Fields> {
        let listener = self.listener.as_ref().filter(|_| report);
        if context.is_mergeable() {
            tracing::debug!("Merging disjoint edits on {}", context.entity);
            if let Some(listener) = listener {
                listener.merge_occurred(context);
            }
            return Ok(context.client_overlay());
        }

        tracing::info!(
            "Conflict on {} over {:?}, resolving with {}",
            context.entity,
            context.overlapping_fields(),
            self.strategy.name()
        );
        if let Some(listener) = listener {
            listener.conflict_occurred(context);
        }

        self.strategy
            .resolve(context)
            .map(|fields| strip_reserved(&fields))
            .map_err(|error| Error::StrategyFailure(error.to_string()))
    }

    /// Resolve `operation` against `server` and re-submit until the server accepts it
    ///
    /// Each further conflict starts a new round with the previous server
    /// snapshot as base and the previous resolution as the client side. The
    /// listener hears about the first round only, so one diverged replay
    /// yields exactly one merge or conflict event.
    pub async fn reconcile(
        &self,
        operation: &QueuedOperation,
        server: Entity,
        transport: &dyn Transport,
    ) -> Resolution {
        let (base, client) = match operation
            .base_or_empty()
            .and_then(|base| Ok((base, operation.client_snapshot()?)))
        {
            Ok(snapshots) => snapshots,
            Err(error) => return Resolution::Failed(error),
        };
        let mut context = ConflictContext::new(base, server, client);

        for attempt in 1..=self.max_retries {
            let fields = match self.resolve(&context, attempt == 1) {
                Ok(fields) => fields,
                Err(error) => return Resolution::Failed(error),
            };

            let resubmitted = operation.mutation.resubmit(&fields, context.server.version);
            tracing::debug!(
                "Re-submitting {} at version {} (attempt {attempt}/{})",
                context.entity,
                context.server.version,
                self.max_retries
            );

            match transport.execute(&resubmitted).await {
                Ok(entity) => return Resolution::Resolved(entity),
                Err(TransportError::VersionConflict(newer)) => {
                    let resolved = Entity::new(context.entity.clone(), context.server.version, fields);
                    context = ConflictContext::new(context.server, newer, resolved);
                }
                Err(TransportError::NetworkUnavailable(reason)) => {
                    return Resolution::Requeue(reason);
                }
                Err(TransportError::Application(message)) => {
                    return Resolution::Failed(Error::Application(message));
                }
            }
        }

        tracing::warn!(
            "Giving up on {} after {} conflicting re-submissions",
            context.entity,
            self.max_retries
        );
        Resolution::Failed(Error::ConflictRetriesExhausted {
            entity: context.entity,
            attempts: self.max_retries,
        })
    }
}
