//! Application startup utilities
//!
//! Wires configuration into a connected store and an HTTP server.

mod http;
mod logging;

pub use http::main_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};

use certvault_persistence::SqlStorage;
use tracing::info;

use crate::config::Configuration;

/// Connect the store and run any configured schema provisioning.
pub async fn connect_storage(configuration: &Configuration) -> anyhow::Result<SqlStorage> {
    let options = configuration.storage_options()?;
    let storage = SqlStorage::connect(options).await?;

    if configuration.provision_schema() {
        storage.provision_schema().await?;
    }
    if let Some(path) = configuration.schema_file() {
        let executed = storage.execute_sql_file(&path).await?;
        info!(file = %path, statements = executed, "Schema file applied");
    }

    Ok(storage)
}
