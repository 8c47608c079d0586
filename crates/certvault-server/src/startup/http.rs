//! HTTP server setup for the demo surface.

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};
use certvault_persistence::SqlStorage;
use tracing::info;

use crate::api;

/// Creates and binds the demo HTTP server. The caller awaits the returned
/// [`Server`].
pub fn main_server(
    storage: SqlStorage,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    info!(address = %address, port, "Starting HTTP server");

    let storage = web::Data::new(storage);
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(storage.clone())
            .configure(api::routes)
    })
    .bind((address, port))?
    .run())
}
