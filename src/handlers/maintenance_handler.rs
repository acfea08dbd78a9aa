//! handlers/maintenance_handler.rs
//! Salud del servicio, plataformas y limpieza de archivos temporales.

use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{authorize, error_response, track};
use crate::{
    models::post_model::Platform,
    services::{api_key_service::ApiKeyService, file_stager::FileStager, publish_service::PublishService},
};

#[derive(Deserialize)]
pub struct SweepQuery {
    max_age_hours: Option<u64>,
}

/// GET /api/health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/platforms
pub async fn platforms_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    publish_service: web::Data<PublishService>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    track(&api_keys, &key, &req, None).await;

    let platforms: Vec<_> = Platform::ALL
        .iter()
        .map(|p| {
            json!({
                "platform": p,
                "configured": publish_service.publishers().get(*p).is_configured()
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({ "platforms": platforms }))
}

/// GET /api/maintenance/temp-files
pub async fn temp_files_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    stager: web::Data<FileStager>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    let result = stager.stats().await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => error_response(&e),
    }
}

/// POST /api/maintenance/sweep
pub async fn sweep_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    stager: web::Data<FileStager>,
    query: web::Query<SweepQuery>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let max_age = query
        .max_age_hours
        .map(|h| Duration::from_secs(h.saturating_mul(3600)))
        .unwrap_or_else(|| stager.retention());

    let result = stager.sweep(max_age).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(cleaned) => HttpResponse::Ok().json(json!({
            "success": true,
            "files_cleaned": cleaned,
            "max_age_hours": max_age.as_secs() / 3600
        })),
        Err(e) => error_response(&e),
    }
}
