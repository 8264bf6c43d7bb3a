//! Mutation and query descriptors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{strip_reserved, version_from_value, EntityRef, Fields};
use crate::error::{Error, Result};

/// A write against one versioned entity
///
/// `variables` must carry the target `id` and the `version` the client last
/// observed; every other variable is a requested field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// GraphQL document
    pub document: String,
    /// Input variables, including `id` and `version`
    pub variables: Map<String, Value>,
    /// Type name of the entity the mutation returns
    pub return_type: String,
}

impl Mutation {
    pub fn new(
        document: impl Into<String>,
        variables: Map<String, Value>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            document: document.into(),
            variables,
            return_type: return_type.into(),
        }
    }

    /// Entity this mutation writes to
    pub fn entity_ref(&self) -> Result<EntityRef> {
        let id = match self.variables.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "{} mutation variables have no id",
                    self.return_type
                )))
            }
        };
        Ok(EntityRef::new(self.return_type.clone(), id))
    }

    /// Version the client observed when issuing this mutation
    pub fn version(&self) -> Result<u64> {
        self.variables
            .get("version")
            .and_then(version_from_value)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{} mutation variables have no integer version",
                    self.return_type
                ))
            })
    }

    /// Requested field changes (variables without `id`/`version`)
    pub fn changes(&self) -> Fields {
        strip_reserved(&self.variables)
    }

    /// Same document re-targeted at `version` with `fields` as input
    #[must_use]
    pub fn resubmit(&self, fields: &Fields, version: u64) -> Self {
        let mut variables = fields.clone();
        if let Some(id) = self.variables.get("id") {
            variables.insert("id".to_string(), id.clone());
        }
        variables.insert("version".to_string(), Value::from(version));
        Self {
            document: self.document.clone(),
            variables,
            return_type: self.return_type.clone(),
        }
    }

    /// Check the descriptor carries an entity id and a version
    pub fn validate(&self) -> Result<()> {
        if self.document.trim().is_empty() {
            return Err(Error::InvalidInput("mutation document is empty".into()));
        }
        self.entity_ref()?;
        self.version()?;
        Ok(())
    }
}

/// A read against the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// GraphQL document
    pub document: String,
    /// Input variables
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl Query {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            variables: Map::new(),
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Stable key used to cache this query's result
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}",
            self.document.trim(),
            Value::Object(self.variables.clone())
        )
    }
}

/// Where `Client::query` reads from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve from cache when present, otherwise fetch
    #[default]
    CacheFirst,
    /// Always fetch, then refresh the cache
    NetworkOnly,
    /// Never touch the network
    CacheOnly,
}
