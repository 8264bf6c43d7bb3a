use std::env;
use std::path::Path;

use ebb_core::util::normalize_text_option;
use ebb_core::SyncSettings;

use crate::cli::ConfigCommands;
use crate::commands::common::{load_settings, ENDPOINT_ENV};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            endpoint,
            namespace,
            max_conflict_retries,
            timeout,
        } => {
            let settings = run_config_init(
                config_path,
                endpoint,
                namespace,
                max_conflict_retries,
                timeout,
            )?;
            println!("Settings written to {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        ConfigCommands::Show => run_config_show(config_path),
    }
}

/// Merge the given values into the settings file at `config_path`
pub fn run_config_init(
    config_path: &Path,
    endpoint: String,
    namespace: Option<String>,
    max_conflict_retries: Option<u32>,
    timeout: Option<u64>,
) -> Result<SyncSettings, CliError> {
    let endpoint = normalize_text_option(Some(endpoint))
        .ok_or_else(|| CliError::Config("endpoint must not be empty".to_string()))?;

    let mut settings = SyncSettings::load_from_path(config_path)?.with_endpoint(Some(endpoint));
    if let Some(namespace) = normalize_text_option(namespace) {
        settings.storage_namespace = namespace;
    }
    if let Some(retries) = max_conflict_retries {
        settings.max_conflict_retries = retries;
    }
    if let Some(timeout) = timeout {
        settings.request_timeout_secs = timeout;
    }

    settings.save_to_path(config_path)?;
    Ok(SyncSettings::load_from_path(config_path)?)
}

pub fn run_config_show(config_path: &Path) -> Result<(), CliError> {
    let settings = load_settings(config_path)?;
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not created yet, using defaults)", config_path.display())
    };

    println!("# {source}");
    if normalize_text_option(env::var(ENDPOINT_ENV).ok()).is_some() {
        println!("# endpoint overridden by {ENDPOINT_ENV}");
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
