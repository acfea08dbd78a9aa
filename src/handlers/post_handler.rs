//! handlers/post_handler.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{authorize, error_response, track};
use crate::{
    errors::PostError,
    models::{
        post_model::{CreatePostRequest, Post, PostDetailResponse, PostStatus, WebhookVideoRequest},
        schedule_model::{ScheduleRequest, ScheduledTrigger},
    },
    services::{
        api_key_service::ApiKeyService,
        post_service::PostService,
        scheduler_service::SchedulerService,
    },
};

#[derive(Deserialize)]
pub struct ListPostsQuery {
    page: Option<u64>,
    page_size: Option<u64>,
    status: Option<String>,
}

/// Aprueba y entrega el post al scheduler en una transacción. No espera la publicación.
async fn approve_and_enqueue(
    post_service: &PostService,
    scheduler: &SchedulerService,
    post_id: &str,
) -> Result<(Post, ScheduledTrigger), PostError> {
    scheduler.approve_and_schedule(post_service, post_id).await
}

/// POST /api/posts
pub async fn create_post_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    post_service: web::Data<PostService>,
    body: web::Json<CreatePostRequest>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    let result = post_service.create_post(body.into_inner()).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(post) => HttpResponse::Created().json(json!({
            "success": true,
            "post": post
        })),
        Err(e) => error_response(&e),
    }
}

/// GET /api/posts
pub async fn list_posts_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    post_service: web::Data<PostService>,
    query: web::Query<ListPostsQuery>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);
    let status = match query.status.as_deref().map(str::parse::<PostStatus>).transpose() {
        Ok(s) => s,
        Err(msg) => {
            let e = PostError::InvalidRequest(msg);
            track(&api_keys, &key, &req, Some(&e)).await;
            return error_response(&e);
        }
    };

    let result = post_service.list_posts(page, page_size, status).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

/// GET /api/posts/{id}
pub async fn get_post_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    post_service: web::Data<PostService>,
    path: web::Path<String>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let post_id = path.into_inner();

    let result = async {
        let post = post_service.get_post(&post_id).await?;
        let platform_results = post_service.platform_results(&post_id).await?;
        Ok::<_, PostError>(PostDetailResponse {
            post,
            platform_results,
        })
    }
    .await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(detail) => HttpResponse::Ok().json(detail),
        Err(e) => error_response(&e),
    }
}

/// POST /api/posts/{id}/approve
pub async fn approve_post_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    post_service: web::Data<PostService>,
    scheduler: web::Data<SchedulerService>,
    path: web::Path<String>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let post_id = path.into_inner();

    let result = approve_and_enqueue(&post_service, &scheduler, &post_id).await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok((post, trigger)) => HttpResponse::Ok().json(json!({
            "success": true,
            "post": post,
            "trigger": trigger,
            "message": "Post approved, publishing queued"
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/posts/{id}/schedule
pub async fn schedule_post_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    scheduler: web::Data<SchedulerService>,
    path: web::Path<String>,
    body: web::Json<ScheduleRequest>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let post_id = path.into_inner();
    let body = body.into_inner();

    let result = scheduler
        .schedule(&post_id, body.at, body.idempotency_key)
        .await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok(trigger) => HttpResponse::Accepted().json(json!({
            "success": true,
            "trigger": trigger
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/webhook/video-upload
pub async fn video_upload_webhook_endpoint(
    req: HttpRequest,
    api_keys: web::Data<ApiKeyService>,
    post_service: web::Data<PostService>,
    scheduler: web::Data<SchedulerService>,
    body: web::Json<WebhookVideoRequest>,
) -> HttpResponse {
    let key = match authorize(&api_keys, &req).await {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let (create_req, auto_approve) = body.into_inner().into_create_request();

    let result = async {
        let post = post_service.create_post(create_req).await?;
        if !auto_approve {
            return Ok::<_, PostError>((post, None));
        }
        let (post, trigger) = approve_and_enqueue(&post_service, &scheduler, &post.id).await?;
        Ok((post, Some(trigger)))
    }
    .await;
    track(&api_keys, &key, &req, result.as_ref().err()).await;

    match result {
        Ok((post, trigger)) => {
            log::info!(
                "(video_upload_webhook) Post {} recibido por webhook (auto_approve={})",
                post.id,
                auto_approve
            );
            HttpResponse::Created().json(json!({
                "success": true,
                "post": post,
                "trigger": trigger
            }))
        }
        Err(e) => error_response(&e),
    }
}
