//! handlers/mod.rs
//! Handlers HTTP (posts, API keys, mantenimiento) y utilidades comunes.

pub mod api_key_handler;
pub mod maintenance_handler;
pub mod post_handler;

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::{
    errors::PostError,
    models::api_key_model::{ApiKeyQuery, ApiKeyRecord},
    services::api_key_service::ApiKeyService,
};

/// Traduce un `PostError` a la respuesta JSON con su código HTTP.
pub fn error_response(err: &PostError) -> HttpResponse {
    let mut builder = match err {
        PostError::NotFound(_) => HttpResponse::NotFound(),
        PostError::InvalidState(_) => HttpResponse::Conflict(),
        PostError::InvalidRequest(_) => HttpResponse::BadRequest(),
        PostError::Unauthorized(_) => HttpResponse::Unauthorized(),
        PostError::RateLimited { .. } => HttpResponse::TooManyRequests(),
        PostError::FetchError(_) | PostError::AuthError { .. } | PostError::RemoteError { .. } => {
            HttpResponse::BadGateway()
        }
        PostError::Database(_) | PostError::Io(_) => {
            log::error!("(error_response) Error interno: {}", err);
            HttpResponse::InternalServerError()
        }
    };

    builder.json(json!({
        "success": false,
        "error": err.category(),
        "details": err.to_string()
    }))
}

/// Valida `?api_key=` y devuelve el registro de la clave.
pub(crate) async fn authorize(
    api_keys: &ApiKeyService,
    req: &HttpRequest,
) -> Result<ApiKeyRecord, HttpResponse> {
    let query = web::Query::<ApiKeyQuery>::from_query(req.query_string()).map_err(|_| {
        error_response(&PostError::Unauthorized("api_key query parameter is required".to_string()))
    })?;

    api_keys
        .validate(&query.api_key)
        .await
        .map_err(|e| error_response(&e))
}

/// Registra la llamada en el historial de uso de la clave.
pub(crate) async fn track(
    api_keys: &ApiKeyService,
    key: &ApiKeyRecord,
    req: &HttpRequest,
    error: Option<&PostError>,
) {
    let error_message = error.map(|e| e.detail());
    api_keys
        .log_usage(
            &key.id,
            req.path(),
            req.method().as_str(),
            error.is_none(),
            error_message.as_deref(),
        )
        .await;
}
