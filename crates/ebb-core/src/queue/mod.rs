//! Offline mutation queue.
//!
//! Every queued write is persisted before `enqueue` returns and replayed once
//! the network is available. Writes to the same entity replay strictly in
//! enqueue order; writes to different entities replay concurrently. A replay
//! that hits a stale version is handed to the [`ConflictEngine`], and only
//! the queue itself writes operation records.

mod persistence;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{oneshot, watch, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};

use crate::cache::EntityCache;
use crate::conflict::{ConflictEngine, Resolution};
use crate::error::{Error, Result};
use crate::models::{Entity, EntityRef, Mutation, OperationId, OperationStatus, QueuedOperation};
use crate::network::NetworkStatus;
use crate::transport::{Transport, TransportError};

pub use persistence::QueueStore;

/// Lifecycle callbacks for queued operations; every method defaults to a no-op
pub trait OperationListener: Send + Sync {
    /// The operation was persisted and is waiting for replay
    fn on_operation_enqueued(&self, _operation: &QueuedOperation) {}

    /// The server accepted the operation (directly or after resolution)
    fn on_operation_success(&self, _operation: &QueuedOperation, _entity: &Entity) {}

    /// The operation reached `Failed`
    fn on_operation_failure(&self, _operation: &QueuedOperation, _error: &Error) {}

    /// The network dropped during replay; the operation is pending again
    fn on_operation_requeued(&self, _operation: &QueuedOperation) {}
}

/// Handle to a queued write, resolving once the operation is terminal
///
/// Dropping the handle does not cancel the operation.
#[derive(Debug)]
pub struct PendingOperation {
    id: OperationId,
    receiver: oneshot::Receiver<Result<Entity>>,
}

impl PendingOperation {
    pub const fn id(&self) -> OperationId {
        self.id
    }
}

impl Future for PendingOperation {
    type Output = Result<Entity>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|settled| settled.unwrap_or_else(|_| Err(Error::QueueClosed)))
    }
}

/// Outcome counts of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Operations that reached a terminal status
    pub settled: usize,
    /// Operations sent back to pending by a network failure
    pub requeued: usize,
}

enum Outcome {
    Settled,
    Requeued,
}

struct Entry {
    entity: EntityRef,
    operation: QueuedOperation,
}

#[derive(Default)]
struct QueueState {
    /// Unresolved operations keyed by their sequence number
    entries: BTreeMap<u64, Entry>,
    waiters: HashMap<OperationId, oneshot::Sender<Result<Entity>>>,
    /// Terminal operations whose storage cleanup has not completed yet
    unsettled: Vec<QueuedOperation>,
    next_seq: u64,
}

impl QueueState {
    fn manifest(&self) -> Vec<OperationId> {
        self.entries.values().map(|entry| entry.operation.id).collect()
    }
}

struct Shared {
    store: QueueStore,
    transport: Arc<dyn Transport>,
    engine: ConflictEngine,
    cache: Arc<EntityCache>,
    listener: Option<Arc<dyn OperationListener>>,
    state: Mutex<QueueState>,
    wake: Notify,
    draining: Mutex<()>,
}

/// The single queue owned by one client instance
///
/// Dropping the queue stops its background worker.
pub struct OfflineQueue {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl OfflineQueue {
    /// Restore persisted operations and start replaying
    ///
    /// `InFlight` and `Conflicted` records left by a previous run are demoted
    /// to `Pending` before anything is replayed. If the network is online and
    /// operations were restored, a drain cycle starts immediately.
    pub async fn start(
        store: QueueStore,
        transport: Arc<dyn Transport>,
        engine: ConflictEngine,
        cache: Arc<EntityCache>,
        network: &dyn NetworkStatus,
        listener: Option<Arc<dyn OperationListener>>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            store,
            transport,
            engine,
            cache,
            listener,
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            draining: Mutex::new(()),
        });

        let restored = shared.restore().await?;
        if restored > 0 {
            tracing::info!(
                "Restored {restored} queued operations from {}",
                shared.store.namespace()
            );
        }

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), network.subscribe()));
        Ok(Self { shared, worker })
    }

    /// Persist `mutation` and schedule it for replay
    ///
    /// `base` is the last confirmed server snapshot of the target entity, if
    /// one was ever observed.
    pub async fn enqueue(&self, mutation: Mutation, base: Option<Entity>) -> Result<PendingOperation> {
        self.shared.enqueue(mutation, base).await
    }

    /// Unresolved operations in enqueue order
    pub async fn pending_operations(&self) -> Vec<QueuedOperation> {
        self.shared
            .state
            .lock()
            .await
            .entries
            .values()
            .map(|entry| entry.operation.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run one drain cycle now, regardless of the network status
    ///
    /// Waits for a cycle already in progress to finish first.
    pub async fn drain(&self) -> DrainSummary {
        self.shared.drain().await
    }
}

impl Drop for OfflineQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(shared: Arc<Shared>, mut network: watch::Receiver<bool>) {
    let mut watching = true;
    loop {
        let offline = *network.borrow_and_update();
        if !offline {
            shared.drain().await;
        }

        if watching {
            tokio::select! {
                () = shared.wake.notified() => {}
                changed = network.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Network status provider went away; draining on enqueue only");
                        watching = false;
                    }
                }
            }
        } else {
            shared.wake.notified().await;
        }
    }
}

impl Shared {
    async fn restore(&self) -> Result<usize> {
        let operations = self.store.recover().await?;
        let mut state = self.state.lock().await;
        for operation in operations {
            let entity = match operation.entity_ref() {
                Ok(entity) => entity,
                Err(error) => {
                    tracing::warn!("Skipping restored operation {}: {error}", operation.id);
                    continue;
                }
            };
            state.next_seq = state.next_seq.max(operation.enqueued_at + 1);
            state
                .entries
                .insert(operation.enqueued_at, Entry { entity, operation });
        }
        Ok(state.entries.len())
    }

    async fn enqueue(&self, mutation: Mutation, base: Option<Entity>) -> Result<PendingOperation> {
        let (sender, receiver) = oneshot::channel();
        let operation = {
            let mut state = self.state.lock().await;
            let operation = QueuedOperation::new(mutation, base, state.next_seq)?;
            let entity = operation.entity_ref()?;

            self.store.save(&operation).await?;
            let mut manifest = state.manifest();
            manifest.push(operation.id);
            if let Err(error) = self.store.write_manifest(&manifest).await {
                if let Err(cleanup) = self.store.delete(operation.id).await {
                    tracing::warn!("Could not remove orphaned record {}: {cleanup}", operation.id);
                }
                return Err(error);
            }

            state.next_seq += 1;
            state.waiters.insert(operation.id, sender);
            state.entries.insert(
                operation.enqueued_at,
                Entry {
                    entity,
                    operation: operation.clone(),
                },
            );
            operation
        };

        tracing::info!(
            "Queued operation {} for {}",
            operation.id,
            operation.mutation.return_type
        );
        if let Some(listener) = &self.listener {
            listener.on_operation_enqueued(&operation);
        }
        self.wake.notify_one();

        Ok(PendingOperation {
            id: operation.id,
            receiver,
        })
    }

    async fn drain(self: &Arc<Self>) -> DrainSummary {
        let _draining = self.draining.lock().await;
        self.discard_unsettled().await;

        let mut summary = DrainSummary::default();
        let mut replays = JoinSet::new();
        let mut halted = false;

        loop {
            if !halted {
                for operation in self.claim_ready().await {
                    let shared = Arc::clone(self);
                    replays.spawn(async move { shared.replay(operation).await });
                }
            }

            let Some(joined) = replays.join_next().await else {
                break;
            };
            match joined {
                Ok(Outcome::Settled) => summary.settled += 1,
                Ok(Outcome::Requeued) => {
                    summary.requeued += 1;
                    halted = true;
                }
                Err(error) => tracing::error!("Replay task failed: {error}"),
            }
        }

        if summary != DrainSummary::default() {
            tracing::info!(
                "Drain cycle finished: {} settled, {} requeued",
                summary.settled,
                summary.requeued
            );
        }
        summary
    }

    /// Mark the head operation of every entity `InFlight` if it is pending
    async fn claim_ready(&self) -> Vec<QueuedOperation> {
        let claimed = {
            let mut state = self.state.lock().await;
            let mut seen = HashSet::new();
            let mut claimed = Vec::new();
            for entry in state.entries.values_mut() {
                if !seen.insert(entry.entity.clone()) {
                    continue;
                }
                if entry.operation.status == OperationStatus::Pending {
                    entry.operation.status = OperationStatus::InFlight;
                    entry.operation.attempts += 1;
                    claimed.push(entry.operation.clone());
                }
            }
            claimed
        };

        let mut ready = Vec::with_capacity(claimed.len());
        for operation in claimed {
            match self.store.save(&operation).await {
                Ok(()) => ready.push(operation),
                Err(error) => {
                    self.fail(operation, error).await;
                }
            }
        }
        ready
    }

    async fn replay(&self, mut operation: QueuedOperation) -> Outcome {
        tracing::debug!(
            "Replaying operation {} (attempt {})",
            operation.id,
            operation.attempts
        );

        match self.transport.execute(&operation.mutation).await {
            Ok(entity) => self.succeed(operation, entity).await,
            Err(TransportError::VersionConflict(server)) => {
                operation.status = OperationStatus::Conflicted;
                if let Err(error) = self.update(&operation).await {
                    return self.fail(operation, error).await;
                }
                match self
                    .engine
                    .reconcile(&operation, server, self.transport.as_ref())
                    .await
                {
                    Resolution::Resolved(entity) => self.succeed(operation, entity).await,
                    Resolution::Requeue(reason) => self.requeue(operation, &reason).await,
                    Resolution::Failed(error) => self.fail(operation, error).await,
                }
            }
            Err(TransportError::NetworkUnavailable(reason)) => self.requeue(operation, &reason).await,
            Err(TransportError::Application(message)) => {
                self.fail(operation, Error::Application(message)).await
            }
        }
    }

    /// Record a non-terminal status change in memory and in storage
    async fn update(&self, operation: &QueuedOperation) -> Result<()> {
        if let Some(entry) = self
            .state
            .lock()
            .await
            .entries
            .get_mut(&operation.enqueued_at)
        {
            entry.operation = operation.clone();
        }
        self.store.save(operation).await
    }

    async fn succeed(&self, mut operation: QueuedOperation, entity: Entity) -> Outcome {
        operation.status = OperationStatus::Succeeded;
        let recorded = self.record_terminal(&operation).await;
        self.cache.put(entity.clone()).await;
        tracing::info!(
            "Operation {} succeeded; {} is at version {}",
            operation.id,
            entity.reference,
            entity.version
        );
        if let Some(listener) = &self.listener {
            listener.on_operation_success(&operation, &entity);
        }
        self.settle(&operation, recorded, Ok(entity)).await;
        Outcome::Settled
    }

    async fn fail(&self, mut operation: QueuedOperation, error: Error) -> Outcome {
        operation.status = OperationStatus::Failed;
        let recorded = self.record_terminal(&operation).await;
        tracing::warn!("Operation {} failed: {error}", operation.id);
        if let Some(listener) = &self.listener {
            listener.on_operation_failure(&operation, &error);
        }
        self.settle(&operation, recorded, Err(error)).await;
        Outcome::Settled
    }

    async fn requeue(&self, mut operation: QueuedOperation, reason: &str) -> Outcome {
        operation.status = OperationStatus::Pending;
        if let Err(error) = self.update(&operation).await {
            return self.fail(operation, error).await;
        }
        tracing::info!("Operation {} requeued: {reason}", operation.id);
        if let Some(listener) = &self.listener {
            listener.on_operation_requeued(&operation);
        }
        Outcome::Requeued
    }

    /// Persist a terminal status so a restart drops the record instead of replaying it
    async fn record_terminal(&self, operation: &QueuedOperation) -> bool {
        match self.store.save(operation).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    "Could not record operation {} as {}: {error}",
                    operation.id,
                    operation.status
                );
                false
            }
        }
    }

    /// Drop a terminal operation from memory and storage, then deliver its result
    ///
    /// Storage that could not be cleaned up is retried at the start of the
    /// next drain cycle.
    async fn settle(&self, operation: &QueuedOperation, recorded: bool, result: Result<Entity>) {
        let mut state = self.state.lock().await;
        state.entries.remove(&operation.enqueued_at);

        let manifest = state.manifest();
        let removed = if recorded {
            match self.remove_record(operation.id, &manifest).await {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(
                        "Could not remove settled operation {} from storage: {error}",
                        operation.id
                    );
                    false
                }
            }
        } else {
            false
        };
        if !removed {
            state.unsettled.push(operation.clone());
        }

        if let Some(waiter) = state.waiters.remove(&operation.id) {
            // The caller may have dropped its handle
            let _ = waiter.send(result);
        }
    }

    async fn remove_record(&self, id: OperationId, manifest: &[OperationId]) -> Result<()> {
        self.store.write_manifest(manifest).await?;
        self.store.delete(id).await
    }

    /// Finish storage cleanup for operations settled while storage was failing
    async fn discard_unsettled(&self) {
        let mut state = self.state.lock().await;
        if state.unsettled.is_empty() {
            return;
        }

        let manifest = state.manifest();
        for operation in std::mem::take(&mut state.unsettled) {
            let cleaned = match self.store.save(&operation).await {
                Ok(()) => self.remove_record(operation.id, &manifest).await,
                Err(error) => Err(error),
            };
            match cleaned {
                Ok(()) => tracing::debug!("Removed settled operation {} from storage", operation.id),
                Err(error) => {
                    tracing::debug!("Settled operation {} still in storage: {error}", operation.id);
                    state.unsettled.push(operation);
                }
            }
        }
    }
}
