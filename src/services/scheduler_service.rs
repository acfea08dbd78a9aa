//! services/scheduler_service.rs
//! Cola diferida respaldada en SQLite. `schedule` solo persiste el disparo;
//! el worker lo toma cuando vence y ejecuta la publicación en una tarea aparte.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tokio::{sync::Notify, task::JoinHandle};
use uuid::Uuid;

use crate::{
    errors::PostError,
    models::{
        post_model::{format_ts, Post, PostStatus},
        publish_model::PublishOutcome,
        schedule_model::{ScheduledTrigger, TriggerRow, TriggerStatus},
    },
    services::{post_service::PostService, publish_service::PublishService},
};

/// Reintentos de infraestructura antes de dar el disparo por muerto.
pub const MAX_TRIGGER_ATTEMPTS: i64 = 5;
const BACKOFF_BASE_SECS: i64 = 30;
const DUE_BATCH_SIZE: i64 = 20;

const TRIGGER_COLUMNS: &str = r#"
    id, post_id, run_at, idempotency_key, status, attempts, last_error, created_at, updated_at
"#;

#[derive(Clone)]
pub struct SchedulerService {
    db_pool: Pool<Sqlite>,
    notify: Arc<Notify>,
}

/// `true` si el disparo es nuevo; una clave repetida no inserta nada.
async fn insert_trigger(
    conn: &mut SqliteConnection,
    post_id: &str,
    at: DateTime<Utc>,
    key: &str,
) -> Result<bool, PostError> {
    let now = format_ts(&Utc::now());
    let result = sqlx::query(
        r#"
        INSERT INTO scheduled_triggers (
            id, post_id, run_at, idempotency_key, status, attempts,
            last_error, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, 'queued', 0, NULL, ?5, ?5)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(post_id)
    .bind(format_ts(&at))
    .bind(key)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Clave usada cuando el disparo nace de una aprobación.
pub fn default_idempotency_key(post_id: &str) -> String {
    format!("{}:publish", post_id)
}

/// 30s, 60s, 120s, ... según el número de intentos ya hechos.
pub fn backoff_delay(attempts: i64) -> chrono::Duration {
    let exponent = (attempts.max(1) - 1).min(16) as u32;
    chrono::Duration::seconds(BACKOFF_BASE_SECS * 2_i64.pow(exponent))
}

impl SchedulerService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self {
            db_pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Entrega el post a la cola para ejecutarse en o después de `at`.
    /// Repetir la misma clave devuelve el disparo existente.
    pub async fn schedule(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
        idempotency_key: Option<String>,
    ) -> Result<ScheduledTrigger, PostError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM posts WHERE id = ?1")
            .bind(post_id)
            .fetch_optional(&self.db_pool)
            .await?;
        let status: PostStatus = status
            .ok_or_else(|| PostError::NotFound(format!("post {}", post_id)))?
            .parse()
            .map_err(PostError::InvalidState)?;
        if status.is_terminal() {
            return Err(PostError::InvalidState(format!(
                "post {} is already {}",
                post_id, status
            )));
        }

        let key = idempotency_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{}", post_id, at.timestamp()));

        let mut conn = self.db_pool.acquire().await?;
        let inserted = insert_trigger(&mut conn, post_id, at, &key).await?;
        drop(conn);

        let trigger = self.trigger_by_key(&key).await?;
        if trigger.post_id != post_id {
            return Err(PostError::InvalidRequest(format!(
                "idempotency key '{}' belongs to another post",
                key
            )));
        }
        self.announce(&trigger, inserted);
        Ok(trigger)
    }

    /// Aprueba el post y encola su publicación en una sola transacción:
    /// o queda aprobado con disparo, o sigue pendiente.
    /// Corre en `scheduled_time` si está en el futuro, si no de inmediato.
    pub async fn approve_and_schedule(
        &self,
        post_service: &PostService,
        post_id: &str,
    ) -> Result<(Post, ScheduledTrigger), PostError> {
        let pending = post_service.get_post(post_id).await?;
        let run_at = pending
            .scheduled_time
            .filter(|t| *t > Utc::now())
            .unwrap_or_else(Utc::now);
        let key = default_idempotency_key(post_id);

        let mut tx = self.db_pool.begin().await?;
        post_service.approve_on(&mut tx, post_id).await?;
        let inserted = insert_trigger(&mut tx, post_id, run_at, &key).await?;
        tx.commit().await?;

        let trigger = self.trigger_by_key(&key).await?;
        self.announce(&trigger, inserted);
        let post = post_service.get_post(post_id).await?;
        Ok((post, trigger))
    }

    fn announce(&self, trigger: &ScheduledTrigger, inserted: bool) {
        if inserted {
            log::info!(
                "(schedule) Post {} programado para {} (clave '{}')",
                trigger.post_id,
                trigger.run_at,
                trigger.idempotency_key
            );
            self.notify.notify_one();
        } else {
            log::info!(
                "(schedule) Clave '{}' ya programada, se reutiliza",
                trigger.idempotency_key
            );
        }
    }

    pub async fn get_trigger(&self, trigger_id: &str) -> Result<ScheduledTrigger, PostError> {
        let sql = format!("SELECT {} FROM scheduled_triggers WHERE id = ?1", TRIGGER_COLUMNS);
        let row = sqlx::query_as::<_, TriggerRow>(&sql)
            .bind(trigger_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| PostError::NotFound(format!("trigger {}", trigger_id)))?;
        Ok(ScheduledTrigger::try_from(row)?)
    }

    async fn trigger_by_key(&self, key: &str) -> Result<ScheduledTrigger, PostError> {
        let sql = format!(
            "SELECT {} FROM scheduled_triggers WHERE idempotency_key = ?1",
            TRIGGER_COLUMNS
        );
        let row = sqlx::query_as::<_, TriggerRow>(&sql)
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| PostError::NotFound(format!("trigger with key {}", key)))?;
        Ok(ScheduledTrigger::try_from(row)?)
    }

    pub async fn triggers_for_post(&self, post_id: &str) -> Result<Vec<ScheduledTrigger>, PostError> {
        let sql = format!(
            "SELECT {} FROM scheduled_triggers WHERE post_id = ?1 ORDER BY run_at",
            TRIGGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, TriggerRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter()
            .map(|r| ScheduledTrigger::try_from(r).map_err(PostError::from))
            .collect()
    }

    pub async fn due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, PostError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM scheduled_triggers
            WHERE status = 'queued' AND run_at <= ?1
            ORDER BY run_at
            LIMIT ?2
            "#,
            TRIGGER_COLUMNS
        );
        let rows = sqlx::query_as::<_, TriggerRow>(&sql)
            .bind(format_ts(&now))
            .bind(DUE_BATCH_SIZE)
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter()
            .map(|r| ScheduledTrigger::try_from(r).map_err(PostError::from))
            .collect()
    }

    /// queued -> running. Solo un llamador gana.
    pub async fn claim(&self, trigger_id: &str) -> Result<bool, PostError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_triggers
            SET status = 'running',
                attempts = attempts + 1,
                updated_at = ?2
            WHERE id = ?1 AND status = 'queued'
            "#,
        )
        .bind(trigger_id)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn complete(
        &self,
        trigger_id: &str,
        status: TriggerStatus,
        last_error: Option<&str>,
    ) -> Result<(), PostError> {
        sqlx::query(
            r#"
            UPDATE scheduled_triggers
            SET status = ?2,
                last_error = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(trigger_id)
        .bind(status.as_str())
        .bind(last_error)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Reencola con backoff exponencial o marca `dead` al agotar intentos.
    pub async fn retry_later(&self, trigger_id: &str, error: &str) -> Result<TriggerStatus, PostError> {
        let trigger = self.get_trigger(trigger_id).await?;
        if trigger.attempts >= MAX_TRIGGER_ATTEMPTS {
            log::error!(
                "(retry_later) Disparo {} agotó {} intentos: {}",
                trigger_id,
                trigger.attempts,
                error
            );
            self.complete(trigger_id, TriggerStatus::Dead, Some(error)).await?;
            return Ok(TriggerStatus::Dead);
        }

        let next_run = Utc::now() + backoff_delay(trigger.attempts);
        sqlx::query(
            r#"
            UPDATE scheduled_triggers
            SET status = 'queued',
                run_at = ?2,
                last_error = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(trigger_id)
        .bind(format_ts(&next_run))
        .bind(error)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        log::warn!(
            "(retry_later) Disparo {} reencolado para {} ({})",
            trigger_id,
            next_run,
            error
        );
        Ok(TriggerStatus::Queued)
    }

    /// Disparos que quedaron en `running` por un reinicio vuelven a la cola.
    /// La clave de idempotencia evita publicar dos veces.
    pub async fn recover_interrupted(&self) -> Result<u64, PostError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_triggers
            SET status = 'queued',
                updated_at = ?1
            WHERE status = 'running'
            "#,
        )
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            log::warn!("(recover_interrupted) {} disparos interrumpidos reencolados", recovered);
        }
        Ok(recovered)
    }

    /// Reclama los disparos vencidos y lanza cada publicación en su propia tarea.
    pub async fn run_due(&self, publish_service: &PublishService) -> Result<Vec<JoinHandle<()>>, PostError> {
        let due = self.due_triggers(Utc::now()).await?;
        let mut handles = Vec::with_capacity(due.len());

        for trigger in due {
            if !self.claim(&trigger.id).await? {
                continue;
            }
            let scheduler = self.clone();
            let publisher = publish_service.clone();
            handles.push(tokio::spawn(async move {
                scheduler.execute(&publisher, trigger).await;
            }));
        }

        Ok(handles)
    }

    async fn execute(&self, publish_service: &PublishService, trigger: ScheduledTrigger) {
        let result = publish_service
            .publish_post(&trigger.post_id, &trigger.idempotency_key)
            .await;

        let bookkeeping = match result {
            Ok(PublishOutcome::Published { .. }) => {
                self.complete(&trigger.id, TriggerStatus::Done, None).await
            }
            Ok(PublishOutcome::Skipped { reason }) => {
                self.complete(&trigger.id, TriggerStatus::Done, Some(&reason)).await
            }
            // Fallo de plataforma: definitivo, no se reintenta
            Ok(PublishOutcome::Failed { error_detail }) => {
                self.complete(&trigger.id, TriggerStatus::Failed, Some(&error_detail))
                    .await
            }
            Err(e) if e.is_publish_failure() => {
                self.complete(&trigger.id, TriggerStatus::Failed, Some(&e.detail()))
                    .await
            }
            Err(e @ (PostError::NotFound(_) | PostError::InvalidState(_))) => {
                self.complete(&trigger.id, TriggerStatus::Failed, Some(&e.detail()))
                    .await
            }
            Err(e) => self.retry_later(&trigger.id, &e.detail()).await.map(|_| ()),
        };

        if let Err(e) = bookkeeping {
            log::error!(
                "(execute) No se pudo actualizar el disparo {}: {}",
                trigger.id,
                e
            );
        }
    }

    /// Worker: despierta cada `poll_interval` o cuando se programa algo nuevo.
    pub fn spawn_worker(self, publish_service: PublishService, poll_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!(
                "(spawn_worker) Worker de publicaciones iniciado (poll={}s)",
                poll_interval.as_secs()
            );
            loop {
                match self.run_due(&publish_service).await {
                    Ok(handles) if !handles.is_empty() => {
                        log::info!("(spawn_worker) {} publicaciones despachadas", handles.len());
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("(spawn_worker) Error leyendo disparos: {}", e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = self.notify.notified() => {}
                }
            }
        })
    }
}
