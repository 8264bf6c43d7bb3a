//! End-to-end replay scenarios against an in-memory versioned backend.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ebb_core::{
    Client, ClientOptions, ConflictContext, Database, Entity, Error, FetchPolicy, Fields,
    ManualNetworkStatus, MemoryStorage, Mutation, OperationStatus, Query, QueueStore,
    QueuedOperation, SqliteConflictLog, SqliteStorage, StrategyError, SyncSettings, Transport,
    TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use support::{eventually, get_task, settle, task_ref, update_task, Backend, Recorder};

struct Harness {
    backend: Arc<Backend>,
    network: Arc<ManualNetworkStatus>,
    storage: Arc<MemoryStorage>,
    recorder: Arc<Recorder>,
}

impl Harness {
    /// Task:0 at version 1 with `title` and `description` both "new"
    fn new() -> Self {
        let backend = Backend::new();
        backend.seed("0", json!({ "title": "new", "description": "new" }));
        Self {
            backend,
            network: Arc::new(ManualNetworkStatus::offline()),
            storage: Arc::new(MemoryStorage::new()),
            recorder: Recorder::new(),
        }
    }

    fn options(&self) -> ClientOptions {
        ClientOptions::new(self.network.clone(), self.storage.clone())
            .with_operation_listener(self.recorder.clone())
            .with_conflict_listener(self.recorder.clone())
    }

    async fn client(&self) -> Client {
        self.client_with(self.options()).await
    }

    async fn client_with(&self, options: ClientOptions) -> Client {
        Client::new(self.backend.clone(), options).await.unwrap()
    }

    fn conflicts(&self) -> usize {
        Recorder::count(&self.recorder.conflicts)
    }

    fn merges(&self) -> usize {
        Recorder::count(&self.recorder.merges)
    }

    fn successes(&self) -> usize {
        Recorder::count(&self.recorder.successes)
    }

    fn failures(&self) -> usize {
        Recorder::count(&self.recorder.failures)
    }
}

/// Takes storage offline right after the server accepts the next write
struct StorageLostAfterWrite {
    backend: Arc<Backend>,
    storage: Arc<MemoryStorage>,
    armed: AtomicBool,
}

#[async_trait]
impl Transport for StorageLostAfterWrite {
    async fn execute(&self, mutation: &Mutation) -> Result<Entity, TransportError> {
        let accepted = self.backend.execute(mutation).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.storage.set_unavailable(true);
        }
        Ok(accepted)
    }

    async fn query(&self, query: &Query) -> Result<Value, TransportError> {
        self.backend.query(query).await
    }
}

/// Load Task:0 into the cache so offline edits have a base snapshot
async fn observe_task(client: &Client) {
    client
        .query(&get_task("0"), FetchPolicy::NetworkOnly)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disjoint_edits_merge_without_conflict() {
    let harness = Harness::new();
    let client = harness.client().await;
    observe_task(&client).await;

    harness.backend.edit("0", json!({ "description": "updated" }));
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "updated" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    let entity = settle(pending).await.unwrap();
    assert_eq!(entity.version, 3);
    assert_eq!(entity.fields["title"], "updated");
    assert_eq!(entity.fields["description"], "updated");
    assert_eq!(harness.merges(), 1);
    assert_eq!(harness.conflicts(), 0);
    assert_eq!(harness.failures(), 0);
    assert_eq!(harness.backend.entity("0"), entity);
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_edits_default_to_client_wins() {
    let harness = Harness::new();
    let client = harness.client().await;
    observe_task(&client).await;

    harness
        .backend
        .edit("0", json!({ "title": "server title", "author": "someone" }));
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "client title" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    let entity = settle(pending).await.unwrap();
    assert_eq!(entity.fields["title"], "client title");
    assert_eq!(entity.fields["author"], "someone");
    assert_eq!(harness.conflicts(), 1);
    assert_eq!(harness.merges(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_strategy_result_is_what_queries_observe() {
    let harness = Harness::new();
    let strategy = |context: &ConflictContext| -> Result<Fields, StrategyError> {
        let mut fields = context.client_overlay();
        fields.insert("description".into(), json!("decided by strategy"));
        Ok(fields)
    };
    let client = harness
        .client_with(harness.options().with_strategy(strategy))
        .await;
    observe_task(&client).await;

    harness
        .backend
        .edit("0", json!({ "title": "server", "description": "server" }));
    let pending = client
        .offline_mutate(update_task(
            "0",
            1,
            json!({ "title": "client", "description": "client" }),
        ))
        .await
        .unwrap();
    harness.network.set_online(true);

    let entity = settle(pending).await.unwrap();
    assert_eq!(entity.fields["description"], "decided by strategy");

    let data = client
        .query(&get_task("0"), FetchPolicy::CacheFirst)
        .await
        .unwrap();
    assert_eq!(data["task"]["description"], "decided by strategy");
    assert_eq!(data["task"]["title"], "client");
    assert_eq!(data["task"]["version"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_edits_each_resolve_against_prior_server_change() {
    let harness = Harness::new();
    let client = harness.client().await;
    observe_task(&client).await;

    harness.backend.edit("0", json!({ "author": "someone" }));
    let first = client
        .offline_mutate(update_task("0", 1, json!({ "title": "first" })))
        .await
        .unwrap();
    let second = client
        .offline_mutate(update_task("0", 1, json!({ "description": "second" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    settle(first).await.unwrap();
    let last = settle(second).await.unwrap();

    assert_eq!(harness.successes(), 2);
    assert_eq!(harness.failures(), 0);
    assert_eq!(last.version, 4);
    assert_eq!(last.fields["title"], "first");
    assert_eq!(last.fields["description"], "second");
    assert_eq!(last.fields["author"], "someone");
}

#[tokio::test(flavor = "multi_thread")]
async fn edits_to_one_entity_replay_in_enqueue_order() {
    let harness = Harness::new();
    let client = harness.client().await;
    observe_task(&client).await;

    let first = client
        .offline_mutate(update_task("0", 1, json!({ "title": "a" })))
        .await
        .unwrap();
    let second = client
        .offline_mutate(update_task("0", 1, json!({ "title": "b" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    settle(first).await.unwrap();
    let last = settle(second).await.unwrap();

    let titles: Vec<_> = harness
        .backend
        .submissions()
        .iter()
        .map(|mutation| mutation.variables["title"].clone())
        .collect();
    assert_eq!(titles, vec![json!("a"), json!("b"), json!("b")]);
    assert_eq!(last.fields["title"], "b");
    assert_eq!(harness.conflicts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_operations_survive_restart() {
    let harness = Harness::new();
    harness.backend.seed("1", json!({ "title": "other" }));

    let client = harness.client().await;
    let orphaned = client
        .offline_mutate(update_task("0", 1, json!({ "title": "from first run" })))
        .await
        .unwrap();
    client
        .offline_mutate(update_task("1", 1, json!({ "title": "also queued" })))
        .await
        .unwrap();
    drop(client);
    assert!(matches!(settle(orphaned).await, Err(Error::QueueClosed)));

    harness.network.set_online(true);
    let client = harness.client().await;
    eventually(|| harness.storage.keys() == vec!["ebb:manifest".to_string()]).await;

    assert_eq!(harness.successes(), 2);
    assert_eq!(harness.backend.entity("0").fields["title"], "from first run");
    assert_eq!(harness.backend.entity("1").fields["title"], "also queued");
    assert!(client.pending_operations().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_records_are_replayed_after_restart() {
    let harness = Harness::new();
    let store = QueueStore::new(harness.storage.clone(), "ebb");
    let mut interrupted =
        QueuedOperation::new(update_task("0", 1, json!({ "title": "interrupted" })), None, 0)
            .unwrap();
    interrupted.status = OperationStatus::InFlight;
    store.save(&interrupted).await.unwrap();
    store.write_manifest(&[interrupted.id]).await.unwrap();

    harness.network.set_online(true);
    let _client = harness.client().await;
    eventually(|| harness.successes() == 1).await;

    assert_eq!(harness.backend.entity("0").fields["title"], "interrupted");
    assert_eq!(harness.backend.entity("0").version, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn settled_write_is_not_replayed_after_storage_recovers() {
    let harness = Harness::new();
    let transport = Arc::new(StorageLostAfterWrite {
        backend: harness.backend.clone(),
        storage: harness.storage.clone(),
        armed: AtomicBool::new(true),
    });
    let client = Client::new(transport, harness.options()).await.unwrap();

    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "mine" })))
        .await
        .unwrap();
    let record = format!("ebb:op:{}", pending.id());
    harness.network.set_online(true);

    let entity = settle(pending).await.unwrap();
    assert_eq!(entity.version, 2);
    assert!(client.pending_operations().await.is_empty());
    assert!(harness.storage.keys().contains(&record));

    harness.storage.set_unavailable(false);
    harness.backend.edit("0", json!({ "title": "someone else" }));
    client.queue().drain().await;
    assert_eq!(harness.storage.keys(), vec!["ebb:manifest".to_string()]);
    drop(client);

    let client = harness.client().await;
    assert!(client.pending_operations().await.is_empty());
    assert_eq!(harness.backend.submissions().len(), 1);
    assert_eq!(harness.backend.entity("0").fields["title"], "someone else");
    assert_eq!(harness.backend.entity("0").version, 3);
    assert_eq!(harness.successes(), 1);
    assert_eq!(harness.conflicts(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn records_settled_before_a_crash_are_dropped_on_restart() {
    let harness = Harness::new();
    let store = QueueStore::new(harness.storage.clone(), "ebb");
    let mut settled =
        QueuedOperation::new(update_task("0", 1, json!({ "title": "applied" })), None, 0)
            .unwrap();
    settled.status = OperationStatus::Succeeded;
    store.save(&settled).await.unwrap();
    store.write_manifest(&[settled.id]).await.unwrap();

    harness.network.set_online(true);
    let client = harness.client().await;

    assert!(client.pending_operations().await.is_empty());
    assert_eq!(harness.storage.keys(), vec!["ebb:manifest".to_string()]);
    assert!(harness.backend.submissions().is_empty());
    assert_eq!(harness.backend.entity("0").version, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_strategy_rejects_the_operation() {
    let harness = Harness::new();
    let strategy = |_: &ConflictContext| -> Result<Fields, StrategyError> {
        Err(StrategyError::new("manual review required"))
    };
    let client = harness
        .client_with(harness.options().with_strategy(strategy))
        .await;
    observe_task(&client).await;

    harness.backend.edit("0", json!({ "title": "server" }));
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "client" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    let error = settle(pending).await.unwrap_err();
    assert!(matches!(error, Error::StrategyFailure(message) if message == "manual review required"));
    assert_eq!(harness.conflicts(), 1);
    assert_eq!(harness.failures(), 1);
    assert_eq!(harness.backend.entity("0").fields["title"], "server");
}

#[tokio::test(flavor = "multi_thread")]
async fn continuous_contention_exhausts_the_retry_ceiling() {
    let harness = Harness::new();
    let settings = SyncSettings {
        max_conflict_retries: 2,
        ..SyncSettings::default()
    };
    let client = harness
        .client_with(harness.options().with_settings(settings))
        .await;
    observe_task(&client).await;

    harness.backend.set_contended(true);
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "client" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    let error = settle(pending).await.unwrap_err();
    assert!(matches!(
        error,
        Error::ConflictRetriesExhausted { attempts: 2, .. }
    ));
    assert_eq!(harness.backend.submissions().len(), 3);
    assert_eq!(harness.failures(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn network_loss_during_replay_requeues_until_next_transition() {
    let harness = Harness::new();
    let client = harness.client().await;

    harness.backend.set_reachable(false);
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "eventually" })))
        .await
        .unwrap();
    harness.network.set_online(true);
    eventually(|| Recorder::count(&harness.recorder.requeued) == 1).await;

    let queued = client.pending_operations().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].status, OperationStatus::Pending);
    assert_eq!(harness.failures(), 0);

    harness.backend.set_reachable(true);
    harness.network.set_online(false);
    harness.network.set_online(true);

    let entity = settle(pending).await.unwrap();
    assert_eq!(entity.fields["title"], "eventually");
}

#[tokio::test(flavor = "multi_thread")]
async fn storage_failure_only_affects_the_failing_enqueue() {
    let harness = Harness::new();
    let client = harness.client().await;

    harness.storage.set_unavailable(true);
    let error = client
        .offline_mutate(update_task("0", 1, json!({ "title": "lost" })))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::StorageFailure(_)));

    harness.storage.set_unavailable(false);
    let pending = client
        .offline_mutate(update_task("0", 1, json!({ "title": "kept" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    assert_eq!(settle(pending).await.unwrap().fields["title"], "kept");
    assert_eq!(Recorder::count(&harness.recorder.enqueued), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn application_errors_fail_the_operation() {
    let harness = Harness::new();
    let client = harness.client().await;

    let pending = client
        .offline_mutate(update_task("missing", 1, json!({ "title": "x" })))
        .await
        .unwrap();
    harness.network.set_online(true);

    let error = settle(pending).await.unwrap_err();
    assert!(matches!(error, Error::Application(message) if message.contains("not found")));
    assert_eq!(harness.failures(), 1);
    assert_eq!(harness.recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_mutations_require_connectivity() {
    let harness = Harness::new();
    let client = harness.client().await;

    let error = client
        .mutate(&update_task("0", 1, json!({ "title": "x" })))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Offline));
    assert!(client.is_offline());

    harness.network.set_online(true);
    let entity = client
        .mutate(&update_task("0", 1, json!({ "title": "x" })))
        .await
        .unwrap();
    assert_eq!(entity.version, 2);
    assert_eq!(client.cache().entity(&task_ref("0")).await, Some(entity));

    let error = client
        .mutate(&update_task("0", 1, json!({ "title": "stale" })))
        .await
        .unwrap_err();
    assert!(matches!(error, Error::VersionConflict { server_version: 2, .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_only_reads_never_hit_the_network() {
    let harness = Harness::new();
    let client = harness.client().await;

    let missing = client
        .query(&get_task("0"), FetchPolicy::CacheOnly)
        .await
        .unwrap();
    assert!(missing.is_null());

    observe_task(&client).await;
    harness.backend.set_reachable(false);
    let cached = client
        .query(&get_task("0"), FetchPolicy::CacheOnly)
        .await
        .unwrap();
    assert_eq!(cached["task"]["title"], "new");
}

#[tokio::test(flavor = "multi_thread")]
async fn conflict_log_records_merges_and_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&tmp.path().join("ebb.db")).unwrap());
    let log = Arc::new(SqliteConflictLog::new(db.clone()));

    let harness = Harness::new();
    let options = ClientOptions::new(
        harness.network.clone(),
        Arc::new(SqliteStorage::new(db)),
    )
    .with_conflict_listener(log.clone());
    let client = harness.client_with(options).await;
    observe_task(&client).await;

    harness.backend.edit("0", json!({ "description": "server" }));
    let merged = client
        .offline_mutate(update_task("0", 1, json!({ "title": "client" })))
        .await
        .unwrap();
    harness.network.set_online(true);
    settle(merged).await.unwrap();

    let records = log.list(10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, "0");
    assert_eq!(records[0].base_version, 1);
    assert_eq!(records[0].server_version, 2);
    assert!(records[0].overlapping_fields.is_empty());
}
