//! app.rs
use crate::handlers::{api_key_handler, maintenance_handler, post_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(maintenance_handler::health_endpoint))
            .route(
                "/platforms",
                web::get().to(maintenance_handler::platforms_endpoint),
            )
            .service(
                web::scope("/posts")
                    .route("", web::post().to(post_handler::create_post_endpoint))
                    .route("", web::get().to(post_handler::list_posts_endpoint))
                    .route("/{id}", web::get().to(post_handler::get_post_endpoint))
                    .route(
                        "/{id}/approve",
                        web::post().to(post_handler::approve_post_endpoint),
                    )
                    .route(
                        "/{id}/schedule",
                        web::post().to(post_handler::schedule_post_endpoint),
                    ),
            )
            .service(web::scope("/webhook").route(
                "/video-upload",
                web::post().to(post_handler::video_upload_webhook_endpoint),
            ))
            .service(
                web::scope("/keys")
                    .route("", web::post().to(api_key_handler::create_api_key_endpoint))
                    .route("/stats", web::get().to(api_key_handler::api_key_stats_endpoint))
                    .route(
                        "/{id}/revoke",
                        web::post().to(api_key_handler::revoke_api_key_endpoint),
                    ),
            )
            .service(
                web::scope("/maintenance")
                    .route(
                        "/temp-files",
                        web::get().to(maintenance_handler::temp_files_endpoint),
                    )
                    .route("/sweep", web::post().to(maintenance_handler::sweep_endpoint)),
            ),
    );
}
