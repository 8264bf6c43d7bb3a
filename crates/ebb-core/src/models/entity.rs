//! Versioned entity model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Application fields of an entity, without `id` and `version`
pub type Fields = Map<String, Value>;

/// Wire keys that are never treated as application fields
const RESERVED_KEYS: [&str; 3] = ["id", "version", "__typename"];

/// Identity of an entity: its type name plus id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub typename: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// An entity snapshot carrying a server-assigned version
///
/// The server increments `version` by exactly one on every successful write.
/// The client only ever echoes a version it has observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub reference: EntityRef,
    pub version: u64,
    pub fields: Fields,
}

impl Entity {
    pub fn new(reference: EntityRef, version: u64, fields: Fields) -> Self {
        Self {
            reference,
            version,
            fields,
        }
    }

    /// Read an entity from its wire form (`{ "id": .., "version": .., ...fields }`)
    pub fn from_payload(typename: &str, payload: &Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::InvalidEntity(format!("{typename} payload is not an object")))?;

        let id = match object.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(Error::InvalidEntity(format!(
                    "{typename} payload has no id"
                )))
            }
        };

        let version = object
            .get("version")
            .and_then(version_from_value)
            .ok_or_else(|| {
                Error::InvalidEntity(format!("{typename}:{id} payload has no integer version"))
            })?;

        Ok(Self {
            reference: EntityRef::new(typename, id),
            version,
            fields: strip_reserved(object),
        })
    }

    /// Wire form of this entity, including `id`, `version` and `__typename`
    pub fn to_payload(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.reference.id.clone()));
        object.insert("version".to_string(), Value::from(self.version));
        object.insert(
            "__typename".to_string(),
            Value::String(self.reference.typename.clone()),
        );
        Value::Object(object)
    }

    /// Copy of this entity with `changes` written over its fields
    #[must_use]
    pub fn overlaid(&self, changes: &Fields) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in changes {
            fields.insert(key.clone(), value.clone());
        }
        Self {
            reference: self.reference.clone(),
            version: self.version,
            fields,
        }
    }
}

/// Read a version number, accepting integers and integer strings
pub fn version_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Copy an object without the reserved wire keys
pub fn strip_reserved(object: &Map<String, Value>) -> Fields {
    object
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keys whose values differ between `base` and `other`
///
/// A key present on only one side counts as changed.
pub fn changed_fields(base: &Fields, other: &Fields) -> BTreeSet<String> {
    base.keys()
        .chain(other.keys())
        .filter(|key| base.get(*key) != other.get(*key))
        .cloned()
        .collect()
}
