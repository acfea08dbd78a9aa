//! services/publisher/instagram.rs
//! Reels por subida reanudable. Se crea el contenedor y se suben los bytes,
//! pero nunca se llama a `media_publish`: el contenedor queda sin publicar.

use std::path::Path;

use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;

use super::{check_response, require, transport_error};
use crate::{
    config::app_config::InstagramConfig,
    errors::PostError,
    models::{
        post_model::Platform,
        publish_model::{InstagramReelInfo, RemotePost},
    },
};

#[derive(Clone)]
pub struct InstagramPublisher {
    config: InstagramConfig,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
    uri: Option<String>,
}

impl InstagramPublisher {
    pub fn new(config: InstagramConfig, http_client: Client) -> Self {
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
        info: &InstagramReelInfo,
    ) -> Result<RemotePost, PostError> {
        let token = require(Platform::Instagram, &self.config.access_token, "Instagram access token")?;
        let account_id = require(Platform::Instagram, &self.config.account_id, "Instagram account id")?;

        // 1) Crear contenedor reanudable
        let container_url = format!(
            "{}/{}/media",
            self.config.graph_api_base.trim_end_matches('/'),
            account_id
        );
        let share_to_feed = info.share_to_feed.to_string();
        let params = [
            ("media_type", "REELS"),
            ("upload_type", "resumable"),
            ("caption", caption),
            ("share_to_feed", share_to_feed.as_str()),
            ("access_token", token),
        ];
        let response = self
            .http_client
            .post(&container_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error(Platform::Instagram, e, Some(token)))?;
        let response = check_response(Platform::Instagram, response, Some(token)).await?;
        let container: ContainerResponse = response.json().await.map_err(|e| PostError::RemoteError {
            platform: Platform::Instagram,
            message: format!("unexpected container response: {}", e),
        })?;
        let upload_uri = container.uri.ok_or_else(|| PostError::RemoteError {
            platform: Platform::Instagram,
            message: format!("container {} has no upload uri", container.id),
        })?;

        // 2) Subir los bytes al contenedor
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();
        log::info!(
            "(instagram::publish) Subiendo {} bytes al contenedor {}",
            size,
            container.id
        );
        let response = self
            .http_client
            .post(&upload_uri)
            .header(AUTHORIZATION, format!("OAuth {}", token))
            .header("offset", "0")
            .header("file_size", size.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(Platform::Instagram, e, Some(token)))?;
        check_response(Platform::Instagram, response, Some(token)).await?;

        log::info!(
            "(instagram::publish) Contenedor {} listo, sin publicar",
            container.id
        );
        Ok(RemotePost {
            platform: Platform::Instagram,
            remote_id: container.id,
        })
    }
}
