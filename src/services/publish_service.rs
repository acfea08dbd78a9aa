//! services/publish_service.rs
//! Intento de publicación de un post aprobado:
//! guard por post -> clave de idempotencia -> staging -> publishers -> limpieza -> estado final.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::{
    errors::PostError,
    models::{
        post_model::{format_ts, Platform, Post, PostStatus},
        publish_model::{compose_caption, PlatformMetadata, PublishOutcome, RemotePost},
    },
    services::{file_stager::FileStager, post_service::PostService, publisher::PublisherSet},
};

#[derive(Clone)]
pub struct PublishService {
    db_pool: Pool<Sqlite>,
    post_service: PostService,
    stager: FileStager,
    publishers: PublisherSet,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Marca el post como "en curso" mientras vive.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    post_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.post_id);
    }
}

type PlatformAttempt = (Platform, Result<RemotePost, PostError>);

/// `error_detail` de un intento que empezó y nunca registró su resultado.
pub const INTERRUPTED_DETAIL: &str = "RemoteError: publish attempt interrupted, outcome unknown";

impl PublishService {
    pub fn new(
        db_pool: Pool<Sqlite>,
        post_service: PostService,
        stager: FileStager,
        publishers: PublisherSet,
    ) -> Self {
        Self {
            db_pool,
            post_service,
            stager,
            publishers,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn publishers(&self) -> &PublisherSet {
        &self.publishers
    }

    /// Publica un post aprobado. Los disparos duplicados devuelven `Skipped`
    /// sin tocar la red. Ningún error se reintenta aquí.
    pub async fn publish_post(
        &self,
        post_id: &str,
        idempotency_key: &str,
    ) -> Result<PublishOutcome, PostError> {
        // 1) Un solo intento a la vez por post
        let _guard = match self.try_claim(post_id) {
            Some(guard) => guard,
            None => {
                log::warn!(
                    "(publish_post) Post {} ya se está publicando, se ignora el disparo",
                    post_id
                );
                return Ok(PublishOutcome::Skipped {
                    reason: "publish already in progress".to_string(),
                });
            }
        };

        // 2) Solo posts aprobados
        let post = self.post_service.get_post(post_id).await?;
        if post.status != PostStatus::Approved {
            log::info!(
                "(publish_post) Post {} está en '{}', nada que publicar",
                post_id,
                post.status
            );
            return Ok(PublishOutcome::Skipped {
                reason: format!("post is {}", post.status),
            });
        }

        // 3) Clave de idempotencia
        if !self.register_attempt(idempotency_key, post_id).await? {
            return self.resolve_reused_key(&post, idempotency_key).await;
        }

        // 4) Staging + publishers. El archivo ya no existe cuando esto devuelve.
        let attempts = self
            .stager
            .with_staged(&post.id, &post.video_url, |path, _size| {
                self.publish_to_platforms(&post, path)
            })
            .await;

        // 5) Estado final
        let outcome = match attempts {
            Ok(attempts) => self.finish(&post, attempts).await?,
            Err(e) => {
                let error_detail = e.detail();
                log::error!(
                    "(publish_post) Falló el staging del post {}: {}",
                    post.id,
                    error_detail
                );
                self.post_service.mark_failed(&post.id, &error_detail).await?;
                PublishOutcome::Failed { error_detail }
            }
        };

        self.complete_attempt(idempotency_key, &outcome).await;
        Ok(outcome)
    }

    async fn publish_to_platforms(
        &self,
        post: &Post,
        local_path: PathBuf,
    ) -> Result<Vec<PlatformAttempt>, PostError> {
        let caption = compose_caption(post);
        let mut attempts = Vec::with_capacity(post.platforms.len());

        for platform in &post.platforms {
            let metadata = PlatformMetadata::for_post(*platform, post);
            log::info!(
                "(publish_to_platforms) Publicando post {} en {}",
                post.id,
                platform
            );
            let result = self
                .publishers
                .get(*platform)
                .publish(&local_path, &caption, &metadata)
                .await;

            if let Err(e) = self
                .post_service
                .record_platform_result(&post.id, *platform, result.as_ref())
                .await
            {
                log::error!(
                    "(publish_to_platforms) No se pudo guardar el resultado de {} para {}: {}",
                    platform,
                    post.id,
                    e
                );
            }
            attempts.push((*platform, result));
        }

        Ok(attempts)
    }

    /// Publicado solo si todas las plataformas aceptaron el video.
    async fn finish(
        &self,
        post: &Post,
        attempts: Vec<PlatformAttempt>,
    ) -> Result<PublishOutcome, PostError> {
        let mut remote_posts = Vec::new();
        let mut failures = Vec::new();
        for (platform, result) in attempts {
            match result {
                Ok(remote) => remote_posts.push(remote),
                Err(e) => failures.push(format!("{}: {}", platform, e.detail())),
            }
        }

        if failures.is_empty() {
            self.post_service.mark_published(&post.id).await?;
            Ok(PublishOutcome::Published { remote_posts })
        } else {
            let error_detail = failures.join("; ");
            self.post_service.mark_failed(&post.id, &error_detail).await?;
            Ok(PublishOutcome::Failed { error_detail })
        }
    }

    /// La clave ya existe y el post sigue aprobado. Si el intento anterior
    /// cerró, es un disparo duplicado. Si nunca cerró (crash o error de DB
    /// tras llamar a las plataformas) el post pudo haber llegado a la
    /// plataforma: se marca `failed` en vez de reintentar a ciegas.
    async fn resolve_reused_key(
        &self,
        post: &Post,
        idempotency_key: &str,
    ) -> Result<PublishOutcome, PostError> {
        let outcome: Option<Option<String>> =
            sqlx::query_scalar("SELECT outcome FROM publish_attempts WHERE idempotency_key = ?1")
                .bind(idempotency_key)
                .fetch_optional(&self.db_pool)
                .await?;

        if let Some(label) = outcome.flatten() {
            log::warn!(
                "(resolve_reused_key) Clave '{}' ya usada para el post {} ({})",
                idempotency_key,
                post.id,
                label
            );
            return Ok(PublishOutcome::Skipped {
                reason: format!("idempotency key '{}' already used", idempotency_key),
            });
        }

        log::error!(
            "(resolve_reused_key) Intento '{}' del post {} quedó sin resultado",
            idempotency_key,
            post.id
        );
        self.post_service.mark_failed(&post.id, INTERRUPTED_DETAIL).await?;
        let outcome = PublishOutcome::Failed {
            error_detail: INTERRUPTED_DETAIL.to_string(),
        };
        self.complete_attempt(idempotency_key, &outcome).await;
        Ok(outcome)
    }

    fn try_claim(&self, post_id: &str) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(post_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: self.in_flight.clone(),
            post_id: post_id.to_string(),
        })
    }

    /// `true` si la clave es nueva.
    async fn register_attempt(&self, idempotency_key: &str, post_id: &str) -> Result<bool, PostError> {
        let result = sqlx::query(
            r#"
            INSERT INTO publish_attempts (idempotency_key, post_id, started_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(idempotency_key)
        .bind(post_id)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_attempt(&self, idempotency_key: &str, outcome: &PublishOutcome) {
        let label = match outcome {
            PublishOutcome::Published { .. } => "published",
            PublishOutcome::Failed { .. } => "failed",
            PublishOutcome::Skipped { .. } => "skipped",
        };

        let result = sqlx::query(
            r#"
            UPDATE publish_attempts
            SET finished_at = ?2,
                outcome = ?3
            WHERE idempotency_key = ?1
            "#,
        )
        .bind(idempotency_key)
        .bind(format_ts(&Utc::now()))
        .bind(label)
        .execute(&self.db_pool)
        .await;

        if let Err(e) = result {
            log::error!(
                "(complete_attempt) No se pudo cerrar el intento '{}': {}",
                idempotency_key,
                e
            );
        }
    }
}
