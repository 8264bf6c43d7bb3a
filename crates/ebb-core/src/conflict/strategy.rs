//! Pluggable conflict strategies

use thiserror::Error;

use super::ConflictContext;
use crate::models::Fields;

/// A strategy declined or failed to resolve a conflict
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Turns `{base, server, client}` into the resolved field set
///
/// Chosen once when the client is built and applied to every conflict it
/// detects. Implementations only see the context by reference.
pub trait ConflictStrategy: Send + Sync {
    fn resolve(&self, context: &ConflictContext) -> Result<Fields, StrategyError>;

    /// Name recorded in logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Every field the client changed overrides the server; the rest keeps the server value
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientWins;

impl ConflictStrategy for ClientWins {
    fn resolve(&self, context: &ConflictContext) -> Result<Fields, StrategyError> {
        Ok(context.client_overlay())
    }

    fn name(&self) -> &str {
        "client-wins"
    }
}

/// Keep the server state and drop the client's edit
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerWins;

impl ConflictStrategy for ServerWins {
    fn resolve(&self, context: &ConflictContext) -> Result<Fields, StrategyError> {
        Ok(context.server.fields.clone())
    }

    fn name(&self) -> &str {
        "server-wins"
    }
}

impl<F> ConflictStrategy for F
where
    F: Fn(&ConflictContext) -> Result<Fields, StrategyError> + Send + Sync,
{
    fn resolve(&self, context: &ConflictContext) -> Result<Fields, StrategyError> {
        self(context)
    }
}
