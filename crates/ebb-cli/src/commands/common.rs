use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ebb_core::models::ConflictRecord;
use ebb_core::{
    Database, OperationId, QueueStore, QueuedOperation, SqliteConflictLog, SqliteStorage,
    SyncSettings,
};
use serde::Serialize;

use crate::error::CliError;

pub const ENDPOINT_ENV: &str = "EBB_ENDPOINT";
const DB_PATH_ENV: &str = "EBB_DB_PATH";
const CONFIG_PATH_ENV: &str = "EBB_CONFIG";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub entity: String,
    pub version: Option<u64>,
    pub status: String,
    pub sequence: u64,
    pub attempts: u32,
    pub created_at: i64,
    pub created_at_iso: String,
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub entity: String,
    pub kind: String,
    pub base_version: u64,
    pub server_version: u64,
    pub overlapping_fields: Vec<String>,
    pub recorded_at: i64,
    pub recorded_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::data_dir()
        .map(|dir| dir.join("ebb").join("ebb.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_config.or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("ebb").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

/// Settings from `config_path`, with the endpoint overridable through `EBB_ENDPOINT`
pub fn load_settings(config_path: &Path) -> Result<SyncSettings, CliError> {
    let settings =
        SyncSettings::load_from_path(config_path)?.with_endpoint(env::var(ENDPOINT_ENV).ok());
    settings.validate()?;
    Ok(settings)
}

pub fn open_database(db_path: &Path) -> Result<Arc<Database>, CliError> {
    Ok(Arc::new(Database::open(db_path)?))
}

pub fn queue_store(db: Arc<Database>, settings: &SyncSettings) -> QueueStore {
    QueueStore::new(
        Arc::new(SqliteStorage::new(db)),
        settings.storage_namespace.clone(),
    )
}

pub fn conflict_log(db: Arc<Database>) -> SqliteConflictLog {
    SqliteConflictLog::new(db)
}

pub fn parse_operation_id(id: &str) -> Result<OperationId, CliError> {
    let trimmed = id.trim();
    trimmed
        .parse()
        .map_err(|_| CliError::InvalidOperationId(trimmed.to_string()))
}

pub fn operation_to_item(operation: &QueuedOperation) -> QueueItem {
    QueueItem {
        id: operation.id.to_string(),
        entity: operation
            .entity_ref()
            .map_or_else(|_| operation.mutation.return_type.clone(), |entity| entity.to_string()),
        version: operation.mutation.version().ok(),
        status: operation.status.to_string(),
        sequence: operation.enqueued_at,
        attempts: operation.attempts,
        created_at: operation.created_at,
        created_at_iso: format_timestamp(operation.created_at),
        changed_fields: operation.mutation.changes().keys().cloned().collect(),
    }
}

pub fn conflict_to_item(record: &ConflictRecord) -> ConflictItem {
    ConflictItem {
        id: record.id,
        entity: format!("{}:{}", record.entity_type, record.entity_id),
        kind: record.kind.to_string(),
        base_version: record.base_version,
        server_version: record.server_version,
        overlapping_fields: record.overlapping_fields.clone(),
        recorded_at: record.recorded_at,
        recorded_at_iso: format_timestamp(record.recorded_at),
    }
}

pub fn format_operation_lines(operations: &[QueuedOperation]) -> Vec<String> {
    operations
        .iter()
        .map(operation_to_item)
        .map(|item| {
            format!(
                "{}  {:<10}  {}  v{}  [{}]  {}",
                item.id,
                item.status,
                item.entity,
                item.version.map_or_else(|| "?".to_string(), |v| v.to_string()),
                item.changed_fields.join(", "),
                item.created_at_iso
            )
        })
        .collect()
}

pub fn format_conflict_lines(records: &[ConflictRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let fields = if record.overlapping_fields.is_empty() {
                String::new()
            } else {
                format!("  fields={}", record.overlapping_fields.join(","))
            };
            format!(
                "{}  {:<8}  {}:{}  base={} server={}{}",
                format_timestamp(record.recorded_at),
                record.kind.as_str(),
                record.entity_type,
                record.entity_id,
                record.base_version,
                record.server_version,
                fields
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
