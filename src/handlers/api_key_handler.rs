//! handlers/api_key_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use super::{authorize, error_response, track};
use crate::{models::api_key_model::CreateApiKeyRequest, services::api_key_service::ApiKeyService};

/// POST /api/keys
pub async fn create_api_key_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    body: Option<web::Json<CreateApiKeyRequest>>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let name = body.and_then(|b| b.into_inner().name);

    let result = api_keys.generate(name).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(created) => HttpResponse::Created().json(json!({
            "success": true,
            "api_key": created,
            "message": "Store this key now, it will not be shown again"
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/keys/{id}/revoke
pub async fn revoke_api_key_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    path: web::Path<String>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let key_id = path.into_inner();

    let result = api_keys.revoke(&key_id).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("API key {} revoked", key_id)
        })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/keys/stats (estadísticas de la clave que hace la llamada)
pub async fn api_key_stats_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    let result = api_keys.stats(&key.id).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => error_response(&e),
    }
}
