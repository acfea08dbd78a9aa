//! services/publisher/facebook.rs
//! Subida de video a una página de Facebook como video no publicado.

use std::path::Path;

use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;

use super::{check_response, require, transport_error};
use crate::{
    config::app_config::FacebookConfig,
    errors::PostError,
    models::{
        post_model::Platform,
        publish_model::{FacebookVideoInfo, RemotePost},
    },
};

#[derive(Clone)]
pub struct FacebookPublisher {
    config: FacebookConfig,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    id: String,
}

impl FacebookPublisher {
    pub fn new(config: FacebookConfig, http_client: Client) -> Self {
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
        info: &FacebookVideoInfo,
    ) -> Result<RemotePost, PostError> {
        let token = require(Platform::Facebook, &self.config.access_token, "Facebook access token")?;
        let page_id = require(Platform::Facebook, &self.config.page_id, "Facebook page id")?;

        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();
        let source = Part::bytes(bytes)
            .file_name("video.mp4")
            .mime_str("video/mp4")
            .map_err(|e| transport_error(Platform::Facebook, e, Some(token)))?;

        // published=false: queda como borrador en la página
        let mut form = Form::new()
            .text("access_token", token.to_string())
            .text("published", "false")
            .text("description", caption.to_string())
            .part("source", source);
        if let Some(title) = info.title.as_ref().filter(|t| !t.trim().is_empty()) {
            form = form.text("title", title.clone());
        }

        let url = format!(
            "{}/{}/videos",
            self.config.video_api_base.trim_end_matches('/'),
            page_id
        );
        log::info!("(facebook::publish) Subiendo {} bytes a la página {}", size, page_id);

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(Platform::Facebook, e, Some(token)))?;
        let response = check_response(Platform::Facebook, response, Some(token)).await?;
        let video: VideoResponse = response.json().await.map_err(|e| PostError::RemoteError {
            platform: Platform::Facebook,
            message: format!("unexpected upload response: {}", e),
        })?;

        log::info!("(facebook::publish) Video no publicado creado, id={}", video.id);
        Ok(RemotePost {
            platform: Platform::Facebook,
            remote_id: video.id,
        })
    }
}
