//! Demo HTTP handlers
//!
//! A read-only view of the certificate store plus the echo handler the demo
//! serves for every other path.

use actix_web::{HttpRequest, HttpResponse, Responder, get, http::StatusCode, web};
use certvault_persistence::{ListRequest, SqlStorage, StorageError};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct StatParams {
    pub key: String,
}

/// HTTP status for a storage failure
pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidKey(_)
        | StorageError::InvalidTimeout(_)
        | StorageError::Unsupported(_) => StatusCode::BAD_REQUEST,
        StorageError::LockHeld(_) | StorageError::Conflict { .. } => StatusCode::CONFLICT,
        StorageError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        StorageError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: StorageError) -> HttpResponse {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "Storage request failed");
    }
    HttpResponse::build(status).json(ErrorBody {
        code: status.as_u16(),
        message: err.to_string(),
    })
}

#[get("/health")]
async fn health(storage: web::Data<SqlStorage>) -> impl Responder {
    match storage.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "UP" })),
        Err(err) => {
            error!(error = %err, "Health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "DOWN",
                "message": err.to_string(),
            }))
        }
    }
}

#[get("/v1/keys")]
async fn list_keys(
    storage: web::Data<SqlStorage>,
    params: web::Query<ListParams>,
) -> impl Responder {
    match storage
        .values()
        .list_by_prefix(&ListRequest::flat(params.prefix.as_str()))
        .await
    {
        Ok(keys) => HttpResponse::Ok().json(keys),
        Err(err) => error_response(err),
    }
}

#[get("/v1/keys/stat")]
async fn stat_key(
    storage: web::Data<SqlStorage>,
    params: web::Query<StatParams>,
) -> impl Responder {
    match storage.values().stat(&params.key).await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(err) => error_response(err),
    }
}

/// Echo the request path
async fn echo(req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(req.path().to_string())
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_keys)
        .service(stat_key)
        .default_service(web::get().to(echo));
}
