//! tests/support.rs
//! Arma servicios reales sobre una SQLite temporal y APIs simuladas con wiremock.

use std::{path::Path, time::Duration};

use serde_json::json;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    config::app_config::{AppConfig, FacebookConfig, InstagramConfig, TiktokConfig},
    models::post_model::{CreatePostRequest, Post},
    services::{
        api_key_service::ApiKeyService, file_stager::FileStager, post_service::PostService,
        publish_service::PublishService, publisher::PublisherSet,
        scheduler_service::SchedulerService,
    },
};

pub const TIKTOK_TOKEN: &str = "tt-secret-token";
pub const FACEBOOK_TOKEN: &str = "fb-secret-token";
pub const INSTAGRAM_TOKEN: &str = "ig-secret-token";
pub const FACEBOOK_PAGE: &str = "page-1";
pub const INSTAGRAM_ACCOUNT: &str = "ig-1";
pub const VIDEO_PATH: &str = "/videos/clip.mp4";

pub struct TestContext {
    // Mantener vivos los directorios mientras dure el test
    _db_dir: TempDir,
    pub staging_dir: TempDir,
    pub db_pool: Pool<Sqlite>,
    pub config: AppConfig,
    pub post_service: PostService,
    pub api_keys: ApiKeyService,
    pub stager: FileStager,
    pub publish_service: PublishService,
    pub scheduler: SchedulerService,
}

pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config(api_base: &str, staging_dir: &Path, database_path: &Path) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: database_path.to_path_buf(),
        staging_dir: staging_dir.to_path_buf(),
        file_retention: Duration::from_secs(24 * 3600),
        sweep_interval: Duration::from_secs(3600),
        scheduler_poll_interval: Duration::from_secs(60),
        fetch_timeout: Duration::from_secs(10),
        publish_timeout: Duration::from_secs(10),
        bootstrap_api_key: None,
        tiktok: TiktokConfig {
            access_token: Some(TIKTOK_TOKEN.to_string()),
            api_base: api_base.to_string(),
        },
        facebook: FacebookConfig {
            access_token: Some(FACEBOOK_TOKEN.to_string()),
            page_id: Some(FACEBOOK_PAGE.to_string()),
            video_api_base: api_base.to_string(),
        },
        instagram: InstagramConfig {
            access_token: Some(INSTAGRAM_TOKEN.to_string()),
            account_id: Some(INSTAGRAM_ACCOUNT.to_string()),
            graph_api_base: api_base.to_string(),
        },
    }
}

/// Contexto completo apuntando todas las plataformas a `server`.
pub async fn setup(server: &MockServer) -> TestContext {
    setup_with(server, |_| {}).await
}

pub async fn setup_with<F>(server: &MockServer, customize: F) -> TestContext
where
    F: FnOnce(&mut AppConfig),
{
    init_test_logger();

    let db_dir = TempDir::new().expect("db temp dir");
    let staging_dir = TempDir::new().expect("staging temp dir");
    let db_path = db_dir.path().join("posts.db");

    let mut config = test_config(&server.uri(), staging_dir.path(), &db_path);
    customize(&mut config);

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("sqlite pool");

    let post_service = PostService::new(db_pool.clone());
    post_service.run_migrations().await.expect("migrations");

    let api_keys = ApiKeyService::new(db_pool.clone());
    let stager = FileStager::new(
        config.staging_dir.clone(),
        config.file_retention,
        config.fetch_timeout,
    )
    .expect("stager");
    let publishers = PublisherSet::from_config(&config).expect("publishers");
    let publish_service = PublishService::new(
        db_pool.clone(),
        post_service.clone(),
        stager.clone(),
        publishers,
    );
    let scheduler = SchedulerService::new(db_pool.clone());

    TestContext {
        _db_dir: db_dir,
        staging_dir,
        db_pool,
        config,
        post_service,
        api_keys,
        stager,
        publish_service,
        scheduler,
    }
}

pub fn video_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), VIDEO_PATH)
}

pub fn post_request(server: &MockServer, platforms: &[&str]) -> CreatePostRequest {
    CreatePostRequest {
        content: "Atardecer en la playa".to_string(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        video_url: video_url(server),
        title: Some("Atardecer".to_string()),
        description: None,
        tags: vec!["viaje".to_string(), "#playa".to_string()],
        scheduled_time: None,
    }
}

pub async fn approved_post(ctx: &TestContext, server: &MockServer, platforms: &[&str]) -> Post {
    let post = ctx
        .post_service
        .create_post(post_request(server, platforms))
        .await
        .expect("create post");
    ctx.post_service.approve(&post.id).await.expect("approve")
}

pub async fn mount_video(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(VIDEO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(server)
        .await;
}

pub async fn mount_tiktok_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2/post/publish/video/init/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "publish_id": "v_pub_123",
                "upload_url": format!("{}/tiktok-upload", server.uri())
            },
            "error": { "code": "ok", "message": "" }
        })))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/tiktok-upload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

pub async fn mount_facebook_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/videos", FACEBOOK_PAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "fb_video_1" })))
        .mount(server)
        .await;
}

pub async fn mount_instagram_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/media", INSTAGRAM_ACCOUNT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ig_container_1",
            "uri": format!("{}/ig-upload/ig_container_1", server.uri())
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ig-upload/ig_container_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(server)
        .await;
}

/// Cuántas peticiones recibió el mock en `request_path`.
pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
