//! Main entry point for the Certvault demo server.

use certvault_server::{config::Configuration, startup};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let storage = startup::connect_storage(&configuration).await?;
    info!(backend = ?storage.backend(), "Certificate store connected");

    let address = configuration.server_address();
    let port = configuration.server_port();
    startup::main_server(storage, address, port)?.await?;

    info!("Server stopped");
    Ok(())
}
