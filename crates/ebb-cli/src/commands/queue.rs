use std::path::Path;
use std::sync::Arc;

use ebb_core::{SqliteStorage, Storage};

use crate::cli::QueueCommands;
use crate::commands::common::{
    format_operation_lines, load_settings, open_database, operation_to_item, parse_operation_id,
    queue_store, QueueItem,
};
use crate::error::CliError;

pub async fn run_queue(
    command: QueueCommands,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    match command {
        QueueCommands::List { json } => run_queue_list(json, db_path, config_path).await,
        QueueCommands::Show { id } => run_queue_show(&id, db_path, config_path).await,
        QueueCommands::Drop { id } => run_queue_drop(&id, db_path, config_path).await,
        QueueCommands::Clear => run_queue_clear(db_path, config_path).await,
    }
}

pub async fn run_queue_list(
    as_json: bool,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let store = queue_store(open_database(db_path)?, &settings);
    let operations = store.list().await?;

    if as_json {
        let json_items = operations
            .iter()
            .map(operation_to_item)
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_operation_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue_show(id: &str, db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let settings = load_settings(config_path)?;
    let store = queue_store(open_database(db_path)?, &settings);

    let operation = store
        .load(id)
        .await?
        .ok_or_else(|| CliError::OperationNotFound(id.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&operation)?);
    Ok(())
}

pub async fn run_queue_drop(id: &str, db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let settings = load_settings(config_path)?;
    let store = queue_store(open_database(db_path)?, &settings);

    if !store.remove(id).await? {
        return Err(CliError::OperationNotFound(id.to_string()));
    }
    println!("Dropped operation {id}");
    Ok(())
}

pub async fn run_queue_clear(db_path: &Path, config_path: &Path) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let db = open_database(db_path)?;
    let store = queue_store(Arc::clone(&db), &settings);

    let removed = store.clear().await?;
    let orphaned = sweep_orphaned_records(&SqliteStorage::new(db), store.namespace()).await?;
    println!("Removed {removed} queued operation(s)");
    if orphaned > 0 {
        println!("Removed {orphaned} orphaned record(s)");
    }
    Ok(())
}

/// Delete operation records the manifest no longer references
///
/// Left behind when a settle lost its storage between the manifest write
/// and the record delete.
async fn sweep_orphaned_records(
    storage: &SqliteStorage,
    namespace: &str,
) -> Result<usize, CliError> {
    let keys = storage.keys_with_prefix(&format!("{namespace}:op:")).await?;
    for key in &keys {
        storage.delete(key).await?;
    }
    Ok(keys.len())
}
