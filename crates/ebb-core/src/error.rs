//! Error types for ebb-core

use thiserror::Error;

use crate::models::EntityRef;

/// Result type alias using ebb-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ebb-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistence unavailable; fatal to the affected operation only
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Transport could not reach the server (includes timeouts)
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Server rejected a direct write because the submitted version is stale
    #[error("Version conflict on {entity} (server is at version {server_version})")]
    VersionConflict {
        entity: EntityRef,
        server_version: u64,
    },

    /// Server rejected the operation for a reason unrelated to versioning
    #[error("Application error: {0}")]
    Application(String),

    /// Conflict strategy could not produce a resolution
    #[error("Conflict strategy failed: {0}")]
    StrategyFailure(String),

    /// Re-submission kept conflicting past the configured ceiling
    #[error("Conflict on {entity} still unresolved after {attempts} re-submissions")]
    ConflictRetriesExhausted { entity: EntityRef, attempts: u32 },

    /// Online-only write attempted while offline
    #[error("Client is offline")]
    Offline,

    /// Payload could not be read as a versioned entity
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The queue stopped before the operation settled
    #[error("Offline queue closed before the operation settled")]
    QueueClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
