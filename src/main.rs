use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::api_key_service::ApiKeyService;
use crate::services::file_stager::{spawn_retention_sweep, FileStager};
use crate::services::post_service::PostService;
use crate::services::publish_service::PublishService;
use crate::services::publisher::PublisherSet;
use crate::services::scheduler_service::SchedulerService;

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(config: &AppConfig) -> anyhow::Result<Pool<Sqlite>> {
    // 1) Crear carpeta de la DB
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
    }

    log::info!("Conectando a SQLite en {}", config.database_path.display());

    // 2) Conectarnos con SQLx
    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env()?;
    let db_pool = setup_database(&config).await?;

    // PostService (dueño de las migraciones)
    let post_service = PostService::new(db_pool.clone());
    post_service.run_migrations().await?;

    // API keys
    let api_key_service = ApiKeyService::new(db_pool.clone());
    match &config.bootstrap_api_key {
        Some(key) => api_key_service.ensure_bootstrap_key(key).await?,
        None => log::warn!("BOOTSTRAP_API_KEY no definida; solo funcionarán claves ya existentes"),
    }

    // Staging + publishers
    let stager = FileStager::new(
        config.staging_dir.clone(),
        config.file_retention,
        config.fetch_timeout,
    )?;
    let publishers = PublisherSet::from_config(&config)?;
    for platform in crate::models::post_model::Platform::ALL {
        if !publishers.get(platform).is_configured() {
            log::warn!("Plataforma {} sin credenciales configuradas", platform);
        }
    }
    let publish_service = PublishService::new(
        db_pool.clone(),
        post_service.clone(),
        stager.clone(),
        publishers,
    );

    // Scheduler: recuperar disparos interrumpidos y arrancar el worker
    let scheduler = SchedulerService::new(db_pool.clone());
    scheduler.recover_interrupted().await?;
    let _worker = scheduler
        .clone()
        .spawn_worker(publish_service.clone(), config.scheduler_poll_interval);

    // Barrido de archivos temporales: uno al arrancar y luego periódico
    let _sweeper = spawn_retention_sweep(stager.clone(), config.sweep_interval);

    // Levantar servidor
    log::info!("Levantando servidor en {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(post_service.clone()))
            .app_data(web::Data::new(api_key_service.clone()))
            .app_data(web::Data::new(stager.clone()))
            .app_data(web::Data::new(publish_service.clone()))
            .app_data(web::Data::new(scheduler.clone()))
            .configure(app::init_app)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
