//! Client facade composing transport, cache, network status and the queue.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::EntityCache;
use crate::config::SyncSettings;
use crate::conflict::{ClientWins, ConflictEngine, ConflictListener, ConflictStrategy};
use crate::error::{Error, Result};
use crate::models::{Entity, FetchPolicy, Mutation, Query, QueuedOperation};
use crate::network::NetworkStatus;
use crate::queue::{OfflineQueue, OperationListener, PendingOperation, QueueStore};
use crate::storage::Storage;
use crate::transport::Transport;

/// Construction options for [`Client`]
pub struct ClientOptions {
    pub network: Arc<dyn NetworkStatus>,
    pub storage: Arc<dyn Storage>,
    pub operation_listener: Option<Arc<dyn OperationListener>>,
    pub conflict_listener: Option<Arc<dyn ConflictListener>>,
    /// Applied to every conflict this client detects; `ClientWins` when unset
    pub strategy: Option<Arc<dyn ConflictStrategy>>,
    pub settings: SyncSettings,
}

impl ClientOptions {
    pub fn new(network: Arc<dyn NetworkStatus>, storage: Arc<dyn Storage>) -> Self {
        Self {
            network,
            storage,
            operation_listener: None,
            conflict_listener: None,
            strategy: None,
            settings: SyncSettings::default(),
        }
    }

    #[must_use]
    pub fn with_operation_listener(mut self, listener: Arc<dyn OperationListener>) -> Self {
        self.operation_listener = Some(listener);
        self
    }

    #[must_use]
    pub fn with_conflict_listener(mut self, listener: Arc<dyn ConflictListener>) -> Self {
        self.conflict_listener = Some(listener);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ConflictStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Offline-capable GraphQL client
pub struct Client {
    transport: Arc<dyn Transport>,
    network: Arc<dyn NetworkStatus>,
    cache: Arc<EntityCache>,
    queue: OfflineQueue,
}

impl Client {
    /// Build the client, restore persisted operations and start watching the network
    pub async fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Result<Self> {
        let ClientOptions {
            network,
            storage,
            operation_listener,
            conflict_listener,
            strategy,
            settings,
        } = options;
        settings.validate()?;

        let strategy = strategy.unwrap_or_else(|| Arc::new(ClientWins));
        tracing::debug!(
            "Starting client with {} strategy, namespace {}",
            strategy.name(),
            settings.storage_namespace
        );
        let mut engine = ConflictEngine::new(strategy, settings.max_conflict_retries);
        if let Some(listener) = conflict_listener {
            engine = engine.with_listener(listener);
        }

        let cache = Arc::new(EntityCache::new());
        let queue = OfflineQueue::start(
            QueueStore::new(storage, settings.storage_namespace.clone()),
            Arc::clone(&transport),
            engine,
            Arc::clone(&cache),
            network.as_ref(),
            operation_listener,
        )
        .await?;

        Ok(Self {
            transport,
            network,
            cache,
            queue,
        })
    }

    /// Read `query` under `policy`
    ///
    /// Results carry the latest cached snapshot of every embedded entity. A
    /// `CacheOnly` miss yields `Value::Null`.
    pub async fn query(&self, query: &Query, policy: FetchPolicy) -> Result<Value> {
        match policy {
            FetchPolicy::CacheOnly => Ok(self.cache.read_query(query).await.unwrap_or(Value::Null)),
            FetchPolicy::CacheFirst => {
                if let Some(cached) = self.cache.read_query(query).await {
                    return Ok(cached);
                }
                self.fetch(query).await
            }
            FetchPolicy::NetworkOnly => self.fetch(query).await,
        }
    }

    async fn fetch(&self, query: &Query) -> Result<Value> {
        let data = self.transport.query(query).await?;
        self.cache.write_query(query, &data).await;
        Ok(self.cache.overlay(data).await)
    }

    /// Online-only write; fails with [`Error::Offline`] without queueing
    ///
    /// A stale version surfaces as [`Error::VersionConflict`].
    pub async fn mutate(&self, mutation: &Mutation) -> Result<Entity> {
        if self.network.is_offline() {
            return Err(Error::Offline);
        }
        mutation.validate()?;
        let entity = self.transport.execute(mutation).await?;
        self.cache.put(entity.clone()).await;
        Ok(entity)
    }

    /// Queue a write regardless of connectivity
    ///
    /// The cache's snapshot of the target entity becomes the merge base.
    pub async fn offline_mutate(&self, mutation: Mutation) -> Result<PendingOperation> {
        let base = self.cache.entity(&mutation.entity_ref()?).await;
        self.queue.enqueue(mutation, base).await
    }

    pub async fn pending_operations(&self) -> Vec<QueuedOperation> {
        self.queue.pending_operations().await
    }

    pub fn is_offline(&self) -> bool {
        self.network.is_offline()
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub const fn queue(&self) -> &OfflineQueue {
        &self.queue
    }
}
