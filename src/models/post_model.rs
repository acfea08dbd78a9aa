use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Plataformas soportadas. Agregar una plataforma = agregar una variante.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Tiktok, Platform::Facebook, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiktok" => Ok(Platform::Tiktok),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            other => Err(format!("unsupported platform '{}'", other)),
        }
    }
}

/// Estados del post. Solo se avanza: pending_approval -> approved -> published | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    PendingApproval,
    Approved,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Approved => "approved",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(PostStatus::PendingApproval),
            "approved" => Ok(PostStatus::Approved),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("unknown post status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub platforms: Vec<Platform>,
    pub status: PostStatus,
    pub video_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
}

/// Fila tal como vive en SQLite (timestamps RFC 3339, listas en JSON).
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: String,
    pub content: String,
    pub platforms: String,
    pub status: String,
    pub video_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: String,
    pub scheduled_time: Option<String>,
    pub created_at: String,
    pub approved_at: Option<String>,
    pub published_at: Option<String>,
    pub error_detail: Option<String>,
}

impl TryFrom<PostRow> for Post {
    type Error = sqlx::Error;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let platform_names: Vec<String> = serde_json::from_str(&row.platforms).map_err(decode)?;
        let platforms = platform_names
            .iter()
            .map(|p| p.parse::<Platform>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode)?;

        Ok(Post {
            id: row.id,
            content: row.content,
            platforms,
            status: row.status.parse().map_err(decode)?,
            video_url: row.video_url,
            title: row.title,
            description: row.description,
            tags: serde_json::from_str(&row.tags).map_err(decode)?,
            scheduled_time: parse_optional_ts(row.scheduled_time)?,
            created_at: parse_ts(&row.created_at)?,
            approved_at: parse_optional_ts(row.approved_at)?,
            published_at: parse_optional_ts(row.published_at)?,
            error_detail: row.error_detail,
        })
    }
}

/// Formato fijo (UTC, microsegundos) para que las comparaciones de texto en
/// SQLite respeten el orden cronológico.
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    raw.parse::<DateTime<Utc>>().map_err(decode)
}

pub(crate) fn parse_optional_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn decode<E>(err: E) -> sqlx::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    sqlx::Error::Decode(err.into())
}

/// Intake: crea un post en estado pending_approval
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    pub platforms: Vec<String>,
    pub video_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Payload del webhook de automatización (n8n). Campos opcionales con los
/// mismos valores por defecto que la versión web.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookVideoRequest {
    #[serde(default)]
    pub content: String,
    pub platforms: Option<Vec<String>>,
    pub video_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub auto_approve: bool,
}

impl WebhookVideoRequest {
    pub fn into_create_request(self) -> (CreatePostRequest, bool) {
        let platforms = self.platforms.unwrap_or_else(|| {
            Platform::ALL
                .iter()
                .map(|p| p.as_str().to_string())
                .collect()
        });
        (
            CreatePostRequest {
                content: self.content,
                platforms,
                video_url: self.video_url,
                title: self.title,
                description: self.description,
                tags: self.tags,
                scheduled_time: None,
            },
            self.auto_approve,
        )
    }
}

/// Resultado por plataforma de un intento de publicación.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlatformResult {
    pub post_id: String,
    pub platform: String,
    pub status: String, // "published", "failed"
    pub remote_id: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub post: Post,
    pub platform_results: Vec<PlatformResult>,
}

/// Para listar posts con paginación
#[derive(Debug, Clone, Serialize)]
pub struct ListPostsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<Post>,
}
