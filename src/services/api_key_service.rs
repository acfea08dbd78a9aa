use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::{
    errors::PostError,
    models::{
        api_key_model::{ApiKeyRecord, ApiKeyStats, CreatedApiKeyResponse, EndpointUsage},
        post_model::format_ts,
    },
};

const API_KEY_COLUMNS: &str = "id, name, api_key, created_at, last_used, usage_count, is_active";

#[derive(Clone, Debug)]
pub struct ApiKeyService {
    db_pool: Pool<Sqlite>,
}

/// 32 bytes aleatorios (dos UUID v4) en base64 url-safe.
fn generate_key() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

impl ApiKeyService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        ApiKeyService { db_pool }
    }

    pub async fn generate(&self, name: Option<String>) -> Result<CreatedApiKeyResponse, PostError> {
        let id = Uuid::new_v4().to_string();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Default API Key".to_string());
        let api_key = generate_key();
        let created_at = format_ts(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, api_key, created_at, usage_count, is_active)
            VALUES (?1, ?2, ?3, ?4, 0, 1)
            "#,
        )
        .bind(&id)
        .bind(&name)
        .bind(&api_key)
        .bind(&created_at)
        .execute(&self.db_pool)
        .await?;

        log::info!("(generate) API key '{}' creada con id={}", name, id);
        Ok(CreatedApiKeyResponse {
            id,
            name,
            api_key,
            created_at,
        })
    }

    /// Registra la clave inicial configurada por entorno (si no existe aún).
    pub async fn ensure_bootstrap_key(&self, api_key: &str) -> Result<(), PostError> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_keys (id, name, api_key, created_at, usage_count, is_active)
            VALUES (?1, 'bootstrap', ?2, ?3, 0, 1)
            ON CONFLICT (api_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(api_key)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 1 {
            log::info!("(ensure_bootstrap_key) API key inicial registrada");
        }
        Ok(())
    }

    /// Valida la clave y actualiza su uso.
    pub async fn validate(&self, api_key: &str) -> Result<ApiKeyRecord, PostError> {
        let sql = format!("SELECT {} FROM api_keys WHERE api_key = ?1", API_KEY_COLUMNS);
        let record = sqlx::query_as::<_, ApiKeyRecord>(&sql)
            .bind(api_key)
            .fetch_optional(&self.db_pool)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| PostError::Unauthorized("invalid or revoked API key".to_string()))?;

        sqlx::query(
            r#"
            UPDATE api_keys
            SET last_used = ?2,
                usage_count = usage_count + 1
            WHERE id = ?1
            "#,
        )
        .bind(&record.id)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        Ok(record)
    }

    pub async fn revoke(&self, key_id: &str) -> Result<(), PostError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?1")
            .bind(key_id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PostError::NotFound(format!("api key {}", key_id)));
        }
        log::info!("(revoke) API key {} revocada", key_id);
        Ok(())
    }

    pub async fn log_usage(
        &self,
        key_id: &str,
        endpoint: &str,
        method: &str,
        success: bool,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO api_key_usage (
                id, api_key_id, endpoint, method, success, error_message, timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key_id)
        .bind(endpoint)
        .bind(method)
        .bind(success)
        .bind(error_message)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await;

        if let Err(e) = result {
            log::error!("(log_usage) No se pudo registrar el uso de la API key: {}", e);
        }
    }

    pub async fn stats(&self, key_id: &str) -> Result<ApiKeyStats, PostError> {
        let sql = format!("SELECT {} FROM api_keys WHERE id = ?1", API_KEY_COLUMNS);
        let record = sqlx::query_as::<_, ApiKeyRecord>(&sql)
            .bind(key_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| PostError::NotFound(format!("api key {}", key_id)))?;

        let since = format_ts(&(Utc::now() - Duration::days(30)));
        let (recent, successes): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(success), 0)
            FROM api_key_usage
            WHERE api_key_id = ?1 AND timestamp >= ?2
            "#,
        )
        .bind(key_id)
        .bind(&since)
        .fetch_one(&self.db_pool)
        .await?;

        let popular_endpoints = sqlx::query_as::<_, EndpointUsage>(
            r#"
            SELECT endpoint, COUNT(*) AS count
            FROM api_key_usage
            WHERE api_key_id = ?1
            GROUP BY endpoint
            ORDER BY count DESC
            LIMIT 5
            "#,
        )
        .bind(key_id)
        .fetch_all(&self.db_pool)
        .await?;

        let success_rate = if recent > 0 {
            successes as f64 / recent as f64 * 100.0
        } else {
            0.0
        };

        Ok(ApiKeyStats {
            api_key_active: record.is_active,
            name: record.name,
            created_at: record.created_at,
            total_usage: record.usage_count,
            last_used: record.last_used,
            recent_usage_30_days: recent,
            success_rate,
            popular_endpoints,
        })
    }
}
