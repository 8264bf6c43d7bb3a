//! ebb-core - Offline-first sync layer for GraphQL clients
//!
//! This crate contains the versioned entity model, the persistent offline
//! mutation queue, the three-way conflict resolution engine and the client
//! facade used by applications and by the `ebb` CLI.

pub mod cache;
pub mod client;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod models;
pub mod network;
pub mod queue;
pub mod storage;
pub mod transport;
pub mod util;

pub use cache::EntityCache;
pub use client::{Client, ClientOptions};
pub use config::SyncSettings;
pub use conflict::{
    ClientWins, ConflictContext, ConflictEngine, ConflictListener, ConflictStrategy, Resolution,
    ServerWins, StrategyError,
};
pub use db::{Database, SqliteConflictLog};
pub use error::{Error, Result};
pub use models::{
    Entity, EntityRef, FetchPolicy, Fields, Mutation, OperationId, OperationStatus, Query,
    QueuedOperation,
};
pub use network::{ManualNetworkStatus, NetworkStatus};
pub use queue::{DrainSummary, OfflineQueue, OperationListener, PendingOperation, QueueStore};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use transport::{GraphQlHttpTransport, Transport, TransportError};
