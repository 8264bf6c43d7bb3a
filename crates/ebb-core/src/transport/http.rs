//! GraphQL-over-HTTP transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Transport, TransportError};
use crate::error::{Error, Result};
use crate::models::{Entity, Mutation, Query};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Posts `{ query, variables }` documents to a GraphQL endpoint
///
/// Version conflicts are recognised by a `conflictInfo.serverState` object in
/// an error's `extensions` (either directly or nested under `exception`).
#[derive(Clone)]
pub struct GraphQlHttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl GraphQlHttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::InvalidInput(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        document: &str,
        variables: &serde_json::Map<String, Value>,
    ) -> std::result::Result<(StatusCode, String), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        Ok((status, body))
    }
}

#[async_trait]
impl Transport for GraphQlHttpTransport {
    async fn execute(&self, mutation: &Mutation) -> std::result::Result<Entity, TransportError> {
        let (status, body) = self.post(&mutation.document, &mutation.variables).await?;
        let data = parse_response(status, &body, Some(&mutation.return_type))?;
        entity_from_data(&mutation.return_type, &data)
    }

    async fn query(&self, query: &Query) -> std::result::Result<Value, TransportError> {
        let (status, body) = self.post(&query.document, &query.variables).await?;
        parse_response(status, &body, None)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphQlError {
    fn server_state(&self) -> Option<&Value> {
        let extensions = self.extensions.as_ref()?;
        extensions
            .pointer("/conflictInfo/serverState")
            .or_else(|| extensions.pointer("/exception/conflictInfo/serverState"))
    }
}

/// Map a raw HTTP response onto the GraphQL `data` payload or a typed failure
fn parse_response(
    status: StatusCode,
    body: &str,
    return_type: Option<&str>,
) -> std::result::Result<Value, TransportError> {
    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        return Err(TransportError::NetworkUnavailable(format!(
            "HTTP {}",
            status.as_u16()
        )));
    }

    let Ok(response) = serde_json::from_str::<GraphQlResponse>(body) else {
        return Err(TransportError::Application(format!(
            "invalid GraphQL response (HTTP {}): {}",
            status.as_u16(),
            compact_text(body)
        )));
    };

    if let Some(return_type) = return_type {
        if let Some(state) = response.errors.iter().find_map(GraphQlError::server_state) {
            let server = Entity::from_payload(return_type, state).map_err(|error| {
                TransportError::Application(format!("unreadable conflict server state: {error}"))
            })?;
            return Err(TransportError::VersionConflict(server));
        }
    }

    if !response.errors.is_empty() {
        let messages = response
            .errors
            .iter()
            .map(|error| error.message.trim())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(TransportError::Application(messages));
    }

    if !status.is_success() {
        return Err(TransportError::Application(format!(
            "HTTP {}: {}",
            status.as_u16(),
            compact_text(body)
        )));
    }

    response
        .data
        .filter(|data| !data.is_null())
        .ok_or_else(|| TransportError::Application("GraphQL response has no data".to_string()))
}

/// The mutation's result is the first root field of `data`
fn entity_from_data(return_type: &str, data: &Value) -> std::result::Result<Entity, TransportError> {
    let payload = data
        .as_object()
        .and_then(|object| object.values().next())
        .ok_or_else(|| TransportError::Application("mutation returned no root field".to_string()))?;
    Entity::from_payload(return_type, payload)
        .map_err(|error| TransportError::Application(error.to_string()))
}

fn request_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        TransportError::NetworkUnavailable(error.to_string())
    } else {
        TransportError::Application(error.to_string())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
