//! Transport contract between the core and the GraphQL backend.

mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::Error;
use crate::models::{Entity, Mutation, Query};

pub use http::GraphQlHttpTransport;

/// Typed failure of one request
#[derive(Debug, Error)]
pub enum TransportError {
    /// The submitted version no longer matches; carries the server's current snapshot
    #[error("Version conflict on {} (server at version {})", .0.reference, .0.version)]
    VersionConflict(Entity),

    /// The request never reached the server or timed out
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The server rejected the request for another reason
    #[error("Application error: {0}")]
    Application(String),
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::VersionConflict(server) => Self::VersionConflict {
                entity: server.reference,
                server_version: server.version,
            },
            TransportError::NetworkUnavailable(message) => Self::NetworkUnavailable(message),
            TransportError::Application(message) => Self::Application(message),
        }
    }
}

/// Executes requests against the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a mutation; success carries the entity with its new version
    async fn execute(&self, mutation: &Mutation) -> Result<Entity, TransportError>;

    /// Run a read query, returning its `data` payload
    async fn query(&self, query: &Query) -> Result<Value, TransportError>;
}
