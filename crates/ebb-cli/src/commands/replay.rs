use std::path::Path;
use std::sync::{Arc, Mutex};

use ebb_core::{
    Client, ClientOptions, Entity, Error, GraphQlHttpTransport, ManualNetworkStatus,
    OperationListener, QueuedOperation, SqliteStorage,
};

use crate::commands::common::{conflict_log, load_settings, open_database};
use crate::error::CliError;

/// Collects one line per settled operation for the final report
#[derive(Default)]
struct ReplayReport {
    lines: Mutex<Vec<String>>,
}

impl ReplayReport {
    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut lines| std::mem::take(&mut *lines))
            .unwrap_or_default()
    }
}

impl OperationListener for ReplayReport {
    fn on_operation_success(&self, operation: &QueuedOperation, entity: &Entity) {
        self.push(format!(
            "ok      {}  {} -> v{}",
            operation.id, entity.reference, entity.version
        ));
    }

    fn on_operation_failure(&self, operation: &QueuedOperation, error: &Error) {
        self.push(format!("failed  {}  {error}", operation.id));
    }
}

pub async fn run_replay(
    endpoint: Option<String>,
    db_path: &Path,
    config_path: &Path,
) -> Result<(), CliError> {
    let settings = load_settings(config_path)?.with_endpoint(endpoint);
    let endpoint = settings
        .endpoint
        .clone()
        .ok_or(CliError::EndpointNotConfigured)?;
    let transport = GraphQlHttpTransport::new(endpoint, settings.request_timeout())?;

    let db = open_database(db_path)?;
    let report = Arc::new(ReplayReport::default());
    // Start offline so the background worker stays idle while this command drains
    let options = ClientOptions::new(
        Arc::new(ManualNetworkStatus::offline()),
        Arc::new(SqliteStorage::new(Arc::clone(&db))),
    )
    .with_operation_listener(report.clone())
    .with_conflict_listener(Arc::new(conflict_log(db)))
    .with_settings(settings);

    let client = Client::new(Arc::new(transport), options).await?;
    if client.queue().is_empty().await {
        println!("Queue is empty.");
        return Ok(());
    }

    let summary = client.queue().drain().await;
    for line in report.take() {
        println!("{line}");
    }

    let remaining = client.queue().len().await;
    if summary.requeued > 0 {
        println!("Server unreachable; {remaining} operation(s) still queued");
    } else {
        println!("Replayed {} operation(s), {remaining} remaining", summary.settled);
    }
    Ok(())
}
