//! Queue records and manifest over a [`Storage`] provider.
//!
//! Layout under a namespace `ns`:
//! - `ns:op:<id>` holds one JSON-encoded [`QueuedOperation`]
//! - `ns:manifest` holds the JSON array of unresolved ids in enqueue order
//!
//! Records are written before the manifest references them, and the manifest
//! drops an id before its record is deleted.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{OperationId, OperationStatus, QueuedOperation};
use crate::storage::Storage;

#[derive(Clone)]
pub struct QueueStore {
    storage: Arc<dyn Storage>,
    namespace: String,
}

impl QueueStore {
    pub fn new(storage: Arc<dyn Storage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn record_key(&self, id: OperationId) -> String {
        format!("{}:op:{id}", self.namespace)
    }

    fn manifest_key(&self) -> String {
        format!("{}:manifest", self.namespace)
    }

    pub async fn manifest(&self) -> Result<Vec<OperationId>> {
        let Some(raw) = self.storage.get(&self.manifest_key()).await? else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = serde_json::from_str(&raw)?;
        Ok(ids
            .iter()
            .filter_map(|id| match id.parse() {
                Ok(id) => Some(id),
                Err(error) => {
                    tracing::warn!("Skipping unreadable manifest entry {id}: {error}");
                    None
                }
            })
            .collect())
    }

    pub async fn write_manifest(&self, ids: &[OperationId]) -> Result<()> {
        let ids: Vec<String> = ids.iter().map(OperationId::as_str).collect();
        let raw = serde_json::to_string(&ids)?;
        self.storage.set(&self.manifest_key(), &raw).await
    }

    pub async fn load(&self, id: OperationId) -> Result<Option<QueuedOperation>> {
        let Some(raw) = self.storage.get(&self.record_key(id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn save(&self, operation: &QueuedOperation) -> Result<()> {
        let raw = serde_json::to_string(operation)?;
        self.storage.set(&self.record_key(operation.id), &raw).await
    }

    pub async fn delete(&self, id: OperationId) -> Result<()> {
        self.storage.delete(&self.record_key(id)).await
    }

    /// Every unresolved operation in enqueue order
    ///
    /// Read-only; entries whose record is missing or unreadable are skipped.
    pub async fn list(&self) -> Result<Vec<QueuedOperation>> {
        let mut operations = Vec::new();
        for id in self.manifest().await? {
            match self.load(id).await {
                Ok(Some(operation)) => operations.push(operation),
                Ok(None) => tracing::warn!("Manifest entry {id} has no stored record"),
                Err(Error::Serialization(error)) => {
                    tracing::warn!("Operation {id} is unreadable: {error}");
                }
                Err(error) => return Err(error),
            }
        }
        operations.sort_by_key(|operation| operation.enqueued_at);
        Ok(operations)
    }

    /// Drop one operation: manifest first, then its record
    pub async fn remove(&self, id: OperationId) -> Result<bool> {
        let mut ids = self.manifest().await?;
        let before = ids.len();
        ids.retain(|entry| *entry != id);
        let removed = ids.len() != before;
        if removed {
            self.write_manifest(&ids).await?;
        }
        self.delete(id).await?;
        Ok(removed)
    }

    /// Drop every operation
    pub async fn clear(&self) -> Result<usize> {
        let ids = self.manifest().await?;
        self.write_manifest(&[]).await?;
        for id in &ids {
            self.delete(*id).await?;
        }
        Ok(ids.len())
    }

    /// Bring the persisted queue back to a replayable state after a restart
    ///
    /// `InFlight` and `Conflicted` records are demoted to `Pending` and
    /// re-persisted, terminal records are removed, and manifest entries
    /// without a readable record are dropped.
    pub async fn recover(&self) -> Result<Vec<QueuedOperation>> {
        let manifest = self.manifest().await?;
        let mut kept = Vec::with_capacity(manifest.len());
        let mut finished = Vec::new();
        let mut dropped = 0usize;

        for id in &manifest {
            let operation = match self.load(*id).await {
                Ok(Some(operation)) => operation,
                Ok(None) => {
                    tracing::warn!("Dropping manifest entry {id}: no stored record");
                    dropped += 1;
                    continue;
                }
                Err(Error::Serialization(error)) => {
                    tracing::warn!("Dropping manifest entry {id}: unreadable record: {error}");
                    finished.push(*id);
                    continue;
                }
                Err(error) => return Err(error),
            };

            match operation.status {
                status if status.is_terminal() => finished.push(*id),
                OperationStatus::InFlight | OperationStatus::Conflicted => {
                    let mut operation = operation;
                    tracing::info!(
                        "Recovering operation {id} from {} to pending",
                        operation.status
                    );
                    operation.status = OperationStatus::Pending;
                    self.save(&operation).await?;
                    kept.push(operation);
                }
                _ => kept.push(operation),
            }
        }

        kept.sort_by_key(|operation| operation.enqueued_at);
        if dropped > 0 || !finished.is_empty() {
            let ids: Vec<OperationId> = kept.iter().map(|operation| operation.id).collect();
            self.write_manifest(&ids).await?;
            for id in finished {
                self.delete(id).await?;
            }
        }
        Ok(kept)
    }
}
