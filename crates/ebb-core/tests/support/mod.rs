//! Shared fixtures for the sync scenarios: an in-memory versioned backend and
//! a listener that counts every callback.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ebb_core::{
    ConflictContext, ConflictListener, Entity, EntityRef, Error, Fields, Mutation,
    OperationListener, Query, QueuedOperation, Transport, TransportError,
};
use serde_json::{json, Value};

pub const UPDATE_TASK: &str = "mutation updateTask($id: ID!, $version: Int!, $title: String, $description: String) {
  updateTask(id: $id, version: $version, title: $title, description: $description) { id version title description }
}";

pub const GET_TASK: &str = "query task($id: ID!) { task(id: $id) { __typename id version title description author } }";

pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

pub fn task_ref(id: &str) -> EntityRef {
    EntityRef::new("Task", id)
}

/// An `updateTask` mutation for `id` issued against `version`
pub fn update_task(id: &str, version: u64, changes: Value) -> Mutation {
    let mut variables = fields(changes);
    variables.insert("id".into(), json!(id));
    variables.insert("version".into(), json!(version));
    Mutation::new(UPDATE_TASK, variables, "Task")
}

pub fn get_task(id: &str) -> Query {
    Query::new(GET_TASK).with_variables(fields(json!({ "id": id })))
}

/// Versioned server: accepts a write only at the current version and bumps it by one
#[derive(Default)]
pub struct Backend {
    entities: Mutex<HashMap<EntityRef, Entity>>,
    submissions: Mutex<Vec<Mutation>>,
    unreachable: AtomicBool,
    contended: AtomicBool,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed `Task:id` at version 1
    pub fn seed(&self, id: &str, value: Value) {
        self.entities
            .lock()
            .unwrap()
            .insert(task_ref(id), Entity::new(task_ref(id), 1, fields(value)));
    }

    /// A write by another, always-online client
    pub fn edit(&self, id: &str, changes: Value) -> Entity {
        let mut entities = self.entities.lock().unwrap();
        let current = entities.get(&task_ref(id)).cloned().unwrap();
        let mut next = current.overlaid(&fields(changes));
        next.version = current.version + 1;
        entities.insert(task_ref(id), next.clone());
        next
    }

    pub fn entity(&self, id: &str) -> Entity {
        self.entities
            .lock()
            .unwrap()
            .get(&task_ref(id))
            .cloned()
            .unwrap()
    }

    pub fn submissions(&self) -> Vec<Mutation> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Let another writer bump the entity right before every submission
    pub fn set_contended(&self, contended: bool) {
        self.contended.store(contended, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for Backend {
    async fn execute(&self, mutation: &Mutation) -> Result<Entity, TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::NetworkUnavailable("connection refused".into()));
        }
        self.submissions.lock().unwrap().push(mutation.clone());

        let reference = mutation
            .entity_ref()
            .map_err(|error| TransportError::Application(error.to_string()))?;
        if self.contended.load(Ordering::SeqCst) {
            let counter = self.entity(&reference.id).version;
            self.edit(&reference.id, json!({ "counter": counter }));
        }

        let mut entities = self.entities.lock().unwrap();
        let Some(current) = entities.get(&reference).cloned() else {
            return Err(TransportError::Application(format!("{reference} not found")));
        };
        if mutation.version().ok() != Some(current.version) {
            return Err(TransportError::VersionConflict(current));
        }

        let mut next = current.overlaid(&mutation.changes());
        next.version = current.version + 1;
        entities.insert(reference, next.clone());
        Ok(next)
    }

    async fn query(&self, query: &Query) -> Result<Value, TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::NetworkUnavailable("connection refused".into()));
        }
        let id = query.variables["id"].as_str().unwrap_or_default();
        let task = self
            .entities
            .lock()
            .unwrap()
            .get(&task_ref(id))
            .map_or(Value::Null, Entity::to_payload);
        Ok(json!({ "task": task }))
    }
}

/// Counts every lifecycle and resolution callback
#[derive(Default)]
pub struct Recorder {
    pub enqueued: AtomicUsize,
    pub successes: AtomicUsize,
    pub failures: AtomicUsize,
    pub requeued: AtomicUsize,
    pub conflicts: AtomicUsize,
    pub merges: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl OperationListener for Recorder {
    fn on_operation_enqueued(&self, _operation: &QueuedOperation) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
    }

    fn on_operation_success(&self, _operation: &QueuedOperation, _entity: &Entity) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_operation_failure(&self, _operation: &QueuedOperation, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_operation_requeued(&self, _operation: &QueuedOperation) {
        self.requeued.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConflictListener for Recorder {
    fn conflict_occurred(&self, _context: &ConflictContext) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }

    fn merge_occurred(&self, _context: &ConflictContext) {
        self.merges.fetch_add(1, Ordering::SeqCst);
    }
}

/// Await `future`, failing the test if it takes longer than five seconds
pub async fn settle<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation did not settle in time")
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn eventually(condition: impl Fn() -> bool) {
    settle(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}
