//! services/publisher/mod.rs
//! Adaptadores por plataforma. Todas las variantes publican SOLO como
//! borrador/privado; pasar a público es siempre una acción manual del usuario.

pub mod facebook;
pub mod instagram;
pub mod tiktok;

use std::{path::Path, time::Duration};

use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};

use crate::{
    config::app_config::AppConfig,
    errors::PostError,
    models::{
        post_model::Platform,
        publish_model::{PlatformMetadata, RemotePost},
    },
};

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use tiktok::TiktokPublisher;

/// Máximo de caracteres del cuerpo remoto que se guarda en `error_detail`.
const MAX_REMOTE_BODY_CHARS: usize = 500;

#[derive(Clone)]
pub enum Publisher {
    Tiktok(TiktokPublisher),
    Facebook(FacebookPublisher),
    Instagram(InstagramPublisher),
}

impl Publisher {
    pub fn platform(&self) -> Platform {
        match self {
            Publisher::Tiktok(_) => Platform::Tiktok,
            Publisher::Facebook(_) => Platform::Facebook,
            Publisher::Instagram(_) => Platform::Instagram,
        }
    }

    pub fn is_configured(&self) -> bool {
        match self {
            Publisher::Tiktok(p) => p.is_configured(),
            Publisher::Facebook(p) => p.is_configured(),
            Publisher::Instagram(p) => p.is_configured(),
        }
    }

    /// Sube el archivo local y crea el borrador remoto. Devuelve el id remoto.
    pub async fn publish(
        &self,
        local_path: &Path,
        caption: &str,
        metadata: &PlatformMetadata,
    ) -> Result<RemotePost, PostError> {
        match (self, metadata) {
            (Publisher::Tiktok(p), PlatformMetadata::Tiktok(info)) => {
                p.publish(local_path, caption, info).await
            }
            (Publisher::Facebook(p), PlatformMetadata::Facebook(info)) => {
                p.publish(local_path, caption, info).await
            }
            (Publisher::Instagram(p), PlatformMetadata::Instagram(info)) => {
                p.publish(local_path, caption, info).await
            }
            (publisher, metadata) => Err(PostError::InvalidRequest(format!(
                "{} metadata cannot be published through the {} publisher",
                metadata.platform(),
                publisher.platform()
            ))),
        }
    }
}

/// Un publisher por plataforma, construidos con su propia config.
#[derive(Clone)]
pub struct PublisherSet {
    tiktok: Publisher,
    facebook: Publisher,
    instagram: Publisher,
}

impl PublisherSet {
    pub fn from_config(config: &AppConfig) -> Result<Self, PostError> {
        let http_client = build_client(config.publish_timeout)?;
        Ok(Self {
            tiktok: Publisher::Tiktok(TiktokPublisher::new(
                config.tiktok.clone(),
                http_client.clone(),
            )),
            facebook: Publisher::Facebook(FacebookPublisher::new(
                config.facebook.clone(),
                http_client.clone(),
            )),
            instagram: Publisher::Instagram(InstagramPublisher::new(
                config.instagram.clone(),
                http_client,
            )),
        })
    }

    pub fn get(&self, platform: Platform) -> &Publisher {
        match platform {
            Platform::Tiktok => &self.tiktok,
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
        }
    }
}

pub fn build_client(timeout: Duration) -> Result<Client, PostError> {
    Client::builder().timeout(timeout).build().map_err(|e| {
        PostError::InvalidRequest(format!("could not build http client: {}", e))
    })
}

/// Clasifica la respuesta: 401/403 -> AuthError, 429 -> RateLimited, otro no-2xx -> RemoteError.
pub(crate) async fn check_response(
    platform: Platform,
    response: Response,
    secret: Option<&str>,
) -> Result<Response, PostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let message = redact(&format!("status {}: {}", status, body), secret);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PostError::AuthError { platform, message },
        StatusCode::TOO_MANY_REQUESTS => PostError::RateLimited {
            platform,
            retry_after,
        },
        _ => PostError::RemoteError { platform, message },
    })
}

/// Fallo de transporte (incluye timeouts). Se quita la URL por si lleva parámetros sensibles.
pub(crate) fn transport_error(platform: Platform, err: reqwest::Error, secret: Option<&str>) -> PostError {
    let err = err.without_url();
    PostError::RemoteError {
        platform,
        message: redact(&err.to_string(), secret),
    }
}

pub(crate) fn require<'a>(
    platform: Platform,
    value: &'a Option<String>,
    what: &str,
) -> Result<&'a str, PostError> {
    value.as_deref().ok_or_else(|| PostError::AuthError {
        platform,
        message: format!("{} not configured, reconnect the account", what),
    })
}

/// Nunca guardar tokens en `error_detail`.
pub(crate) fn redact(text: &str, secret: Option<&str>) -> String {
    let cleaned = match secret {
        Some(s) if !s.is_empty() => text.replace(s, "[redacted]"),
        _ => text.to_string(),
    };
    if cleaned.chars().count() > MAX_REMOTE_BODY_CHARS {
        let truncated: String = cleaned.chars().take(MAX_REMOTE_BODY_CHARS).collect();
        format!("{}...", truncated)
    } else {
        cleaned
    }
}
