//! Normalized local cache of confirmed server state.
//!
//! Holds one snapshot per entity plus the raw `data` of every query that went
//! to the network. Query reads are rebuilt from the raw data with every
//! embedded entity (an object carrying `__typename` and `id`) overlaid by its
//! latest snapshot, so a replayed write is visible to the next read.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::models::{Entity, EntityRef, Query};

#[derive(Default)]
pub struct EntityCache {
    entities: RwLock<HashMap<EntityRef, Entity>>,
    queries: RwLock<HashMap<String, Value>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entity(&self, reference: &EntityRef) -> Option<Entity> {
        self.entities.read().await.get(reference).cloned()
    }

    /// Store `entity` unless a newer version is already cached
    pub async fn put(&self, entity: Entity) -> bool {
        let mut entities = self.entities.write().await;
        if let Some(existing) = entities.get(&entity.reference) {
            if existing.version > entity.version {
                tracing::debug!(
                    "Ignoring stale snapshot of {} (v{} < v{})",
                    entity.reference,
                    entity.version,
                    existing.version
                );
                return false;
            }
        }
        entities.insert(entity.reference.clone(), entity);
        true
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Remember a network result and normalize the versioned entities inside it
    pub async fn write_query(&self, query: &Query, data: &Value) {
        let mut found = Vec::new();
        collect_entities(data, &mut found);
        for entity in found {
            self.put(entity).await;
        }
        self.queries
            .write()
            .await
            .insert(query.cache_key(), data.clone());
    }

    /// The cached result of `query` with entity snapshots applied
    pub async fn read_query(&self, query: &Query) -> Option<Value> {
        let data = self.queries.read().await.get(&query.cache_key()).cloned()?;
        Some(self.overlay(data).await)
    }

    /// Replace every embedded entity's selected fields with the cached snapshot
    pub async fn overlay(&self, data: Value) -> Value {
        let entities = self.entities.read().await;
        overlay_value(data, &entities)
    }
}

fn embedded_ref(object: &Map<String, Value>) -> Option<EntityRef> {
    let typename = object.get("__typename")?.as_str()?;
    let id = match object.get("id")? {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    Some(EntityRef::new(typename, id))
}

fn collect_entities(value: &Value, found: &mut Vec<Entity>) {
    match value {
        Value::Object(object) => {
            if let Some(reference) = embedded_ref(object) {
                if let Ok(entity) = Entity::from_payload(&reference.typename, value) {
                    found.push(entity);
                }
            }
            for child in object.values() {
                collect_entities(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_entities(item, found);
            }
        }
        _ => {}
    }
}

fn overlay_value(value: Value, entities: &HashMap<EntityRef, Entity>) -> Value {
    match value {
        Value::Object(object) => {
            let cached = embedded_ref(&object).and_then(|reference| entities.get(&reference));
            let overlaid = object
                .into_iter()
                .map(|(key, child)| {
                    let replacement = cached.and_then(|entity| {
                        if key == "version" {
                            Some(Value::from(entity.version))
                        } else {
                            entity.fields.get(&key).cloned()
                        }
                    });
                    let child = replacement.unwrap_or_else(|| overlay_value(child, entities));
                    (key, child)
                })
                .collect();
            Value::Object(overlaid)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| overlay_value(item, entities))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(version: u64, title: &str) -> Entity {
        Entity::new(
            EntityRef::new("Task", "0"),
            version,
            json!({ "title": title }).as_object().cloned().unwrap(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_keeps_newest_version() {
        let cache = EntityCache::new();
        assert!(cache.put(task(2, "two")).await);
        assert!(!cache.put(task(1, "one")).await);
        assert!(cache.put(task(3, "three")).await);

        let cached = cache.entity(&EntityRef::new("Task", "0")).await.unwrap();
        assert_eq!(cached.version, 3);
        assert_eq!(cached.fields["title"], "three");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_query_normalizes_entities() {
        let cache = EntityCache::new();
        let query = Query::new("{ allTasks { id version title __typename } }");
        let data = json!({
            "allTasks": [
                { "__typename": "Task", "id": "0", "version": 1, "title": "new" },
                { "__typename": "Task", "id": 1, "version": 4, "title": "other" },
                { "__typename": "Task", "id": "2", "title": "unversioned" }
            ]
        });

        cache.write_query(&query, &data).await;

        assert_eq!(cache.len().await, 2);
        let other = cache.entity(&EntityRef::new("Task", "1")).await.unwrap();
        assert_eq!(other.version, 4);
        assert_eq!(cache.read_query(&query).await, Some(data));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_query_observes_newer_snapshots() {
        let cache = EntityCache::new();
        let query = Query::new("{ task(id: 0) { id version title description __typename } }");
        cache
            .write_query(
                &query,
                &json!({
                    "task": {
                        "__typename": "Task", "id": "0", "version": 1,
                        "title": "new", "description": "new"
                    }
                }),
            )
            .await;

        let mut updated = task(2, "updated");
        updated.fields.insert("author".into(), json!("someone"));
        cache.put(updated).await;

        assert_eq!(
            cache.read_query(&query).await.unwrap(),
            json!({
                "task": {
                    "__typename": "Task", "id": "0", "version": 2,
                    "title": "updated", "description": "new"
                }
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_query_misses_unknown_queries() {
        let cache = EntityCache::new();
        assert_eq!(cache.read_query(&Query::new("{ a }")).await, None);
        assert!(cache.is_empty().await);
    }
}
