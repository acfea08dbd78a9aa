//! services/publisher/tiktok.rs
//! TikTok Content Posting API (subida directa de archivo).

use std::{io::SeekFrom, path::Path};

use reqwest::{
    header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE},
    Client,
};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{check_response, redact, require, transport_error};
use crate::{
    config::app_config::TiktokConfig,
    errors::PostError,
    models::{
        post_model::Platform,
        publish_model::{RemotePost, TiktokPostInfo},
    },
};

/// Solo visible para el dueño de la cuenta.
const PRIVACY_LEVEL: &str = "SELF_ONLY";
const TITLE_MAX_CHARS: usize = 2200;
/// Hasta este tamaño el video se sube en un único chunk.
const SINGLE_CHUNK_MAX_BYTES: u64 = 64 * 1024 * 1024;
const CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct TiktokPublisher {
    config: TiktokConfig,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    data: Option<InitData>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Plan de subida por chunks según las reglas de la API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkPlan {
    pub chunk_size: u64,
    pub total_chunk_count: u64,
}

impl ChunkPlan {
    pub(crate) fn for_size(video_size: u64) -> Self {
        if video_size <= SINGLE_CHUNK_MAX_BYTES {
            return ChunkPlan {
                chunk_size: video_size,
                total_chunk_count: 1,
            };
        }
        // El último chunk absorbe el resto.
        ChunkPlan {
            chunk_size: CHUNK_SIZE_BYTES,
            total_chunk_count: video_size / CHUNK_SIZE_BYTES,
        }
    }

    /// Rango [inicio, fin) del chunk `index`.
    pub(crate) fn range(&self, index: u64, video_size: u64) -> (u64, u64) {
        let start = index * self.chunk_size;
        let end = if index + 1 == self.total_chunk_count {
            video_size
        } else {
            start + self.chunk_size
        };
        (start, end)
    }
}

impl TiktokPublisher {
    pub fn new(config: TiktokConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn publish(
        &self,
        local_path: &Path,
        caption: &str,
        info: &TiktokPostInfo,
    ) -> Result<RemotePost, PostError> {
        let token = require(Platform::Tiktok, &self.config.access_token, "TikTok access token")?;
        let video_size = tokio::fs::metadata(local_path).await?.len();
        let plan = ChunkPlan::for_size(video_size);

        // 1) Inicializar la subida
        let init_url = format!(
            "{}/v2/post/publish/video/init/",
            self.config.api_base.trim_end_matches('/')
        );
        let body = json!({
            "post_info": {
                "title": caption.chars().take(TITLE_MAX_CHARS).collect::<String>(),
                "privacy_level": PRIVACY_LEVEL,
                "disable_duet": info.disable_duet,
                "disable_comment": info.disable_comment,
                "disable_stitch": info.disable_stitch,
                "video_cover_timestamp_ms": info.video_cover_timestamp_ms
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": plan.chunk_size,
                "total_chunk_count": plan.total_chunk_count
            }
        });

        log::info!(
            "(tiktok::publish) Inicializando subida: {} bytes en {} chunk(s)",
            video_size,
            plan.total_chunk_count
        );
        let response = self
            .http_client
            .post(&init_url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(Platform::Tiktok, e, Some(token)))?;
        let response = check_response(Platform::Tiktok, response, Some(token)).await?;
        let init: InitResponse = response.json().await.map_err(|e| PostError::RemoteError {
            platform: Platform::Tiktok,
            message: format!("unexpected init response: {}", e),
        })?;

        if let Some(err) = init.error.as_ref().filter(|e| e.code != "ok") {
            return Err(classify_api_error(err, token));
        }
        let data = init.data.ok_or_else(|| PostError::RemoteError {
            platform: Platform::Tiktok,
            message: "init response without data".to_string(),
        })?;

        // 2) Subir los bytes
        let mut file = tokio::fs::File::open(local_path).await?;
        for index in 0..plan.total_chunk_count {
            let (start, end) = plan.range(index, video_size);
            let mut chunk = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut chunk).await?;

            let response = self
                .http_client
                .put(&data.upload_url)
                .header(CONTENT_TYPE, "video/mp4")
                .header(CONTENT_RANGE, format!("bytes {}-{}/{}", start, end - 1, video_size))
                .body(chunk)
                .send()
                .await
                .map_err(|e| transport_error(Platform::Tiktok, e, Some(token)))?;
            check_response(Platform::Tiktok, response, Some(token)).await?;
        }

        log::info!(
            "(tiktok::publish) Video subido como borrador privado, publish_id={}",
            data.publish_id
        );
        Ok(RemotePost {
            platform: Platform::Tiktok,
            remote_id: data.publish_id,
        })
    }
}

/// TikTok a veces responde 200 con un código de error en el cuerpo.
fn classify_api_error(err: &ApiError, token: &str) -> PostError {
    let message = redact(&format!("{}: {}", err.code, err.message), Some(token));
    match err.code.as_str() {
        "access_token_invalid" | "scope_not_authorized" | "token_not_authorized_for_specified_creator" => {
            PostError::AuthError {
                platform: Platform::Tiktok,
                message,
            }
        }
        "rate_limit_exceeded" | "spam_risk_too_many_posts" => PostError::RateLimited {
            platform: Platform::Tiktok,
            retry_after: None,
        },
        _ => PostError::RemoteError {
            platform: Platform::Tiktok,
            message,
        },
    }
}
