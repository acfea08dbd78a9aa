use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::post_model::{decode, parse_ts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Queued,
    Running,
    Done,
    Failed,
    /// Agotó los reintentos de infraestructura.
    Dead,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Queued => "queued",
            TriggerStatus::Running => "running",
            TriggerStatus::Done => "done",
            TriggerStatus::Failed => "failed",
            TriggerStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TriggerStatus::Queued),
            "running" => Ok(TriggerStatus::Running),
            "done" => Ok(TriggerStatus::Done),
            "failed" => Ok(TriggerStatus::Failed),
            "dead" => Ok(TriggerStatus::Dead),
            other => Err(format!("unknown trigger status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTrigger {
    pub id: String,
    pub post_id: String,
    pub run_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub status: TriggerStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TriggerRow {
    pub id: String,
    pub post_id: String,
    pub run_at: String,
    pub idempotency_key: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<TriggerRow> for ScheduledTrigger {
    type Error = sqlx::Error;

    fn try_from(row: TriggerRow) -> Result<Self, Self::Error> {
        Ok(ScheduledTrigger {
            id: row.id,
            post_id: row.post_id,
            run_at: parse_ts(&row.run_at)?,
            idempotency_key: row.idempotency_key,
            status: row.status.parse().map_err(decode)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

/// POST /api/posts/{id}/schedule
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}
