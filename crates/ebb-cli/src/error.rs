use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ebb_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),
    #[error("No queued operation with id {0}")]
    OperationNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No endpoint configured. Run `ebb config init --endpoint <URL>` or set EBB_ENDPOINT."
    )]
    EndpointNotConfigured,
}
