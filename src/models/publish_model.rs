use serde::Serialize;

use crate::models::post_model::{Platform, Post};

/// Opciones por plataforma. Cada variante lleva solo lo que su API necesita.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformMetadata {
    Tiktok(TiktokPostInfo),
    Facebook(FacebookVideoInfo),
    Instagram(InstagramReelInfo),
}

#[derive(Debug, Clone, Serialize)]
pub struct TiktokPostInfo {
    pub disable_duet: bool,
    pub disable_comment: bool,
    pub disable_stitch: bool,
    pub video_cover_timestamp_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacebookVideoInfo {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstagramReelInfo {
    pub share_to_feed: bool,
}

impl PlatformMetadata {
    pub fn for_post(platform: Platform, post: &Post) -> Self {
        match platform {
            Platform::Tiktok => PlatformMetadata::Tiktok(TiktokPostInfo {
                disable_duet: false,
                disable_comment: false,
                disable_stitch: false,
                video_cover_timestamp_ms: 1000,
            }),
            Platform::Facebook => PlatformMetadata::Facebook(FacebookVideoInfo {
                title: post.title.clone(),
            }),
            Platform::Instagram => PlatformMetadata::Instagram(InstagramReelInfo {
                share_to_feed: false,
            }),
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformMetadata::Tiktok(_) => Platform::Tiktok,
            PlatformMetadata::Facebook(_) => Platform::Facebook,
            PlatformMetadata::Instagram(_) => Platform::Instagram,
        }
    }
}

/// Caption final: contenido (o descripción si está vacío) + hashtags.
pub fn compose_caption(post: &Post) -> String {
    let base = if post.content.trim().is_empty() {
        post.description.clone().unwrap_or_default()
    } else {
        post.content.clone()
    };

    let hashtags: Vec<String> = post
        .tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect();

    if hashtags.is_empty() {
        base
    } else if base.is_empty() {
        hashtags.join(" ")
    } else {
        format!("{} {}", base, hashtags.join(" "))
    }
}

/// Identificador del borrador creado en la plataforma remota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePost {
    pub platform: Platform,
    pub remote_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published { remote_posts: Vec<RemotePost> },
    Failed { error_detail: String },
    /// Disparo duplicado o post ya procesado; no se llamó a ninguna plataforma.
    Skipped { reason: String },
}
