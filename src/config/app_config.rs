//! config/app_config.rs
//! Configuración explícita de la aplicación. Se construye una sola vez en
//! `main` y cada servicio recibe la parte que necesita.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_TIKTOK_API_BASE: &str = "https://open.tiktokapis.com";
const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";
const DEFAULT_GRAPH_VIDEO_BASE: &str = "https://graph-video.facebook.com/v18.0";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub staging_dir: PathBuf,
    /// Antigüedad máxima de un archivo temporal antes de que el barrido lo borre.
    pub file_retention: Duration,
    pub sweep_interval: Duration,
    pub scheduler_poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub bootstrap_api_key: Option<String>,
    pub tiktok: TiktokConfig,
    pub facebook: FacebookConfig,
    pub instagram: InstagramConfig,
}

#[derive(Debug, Clone)]
pub struct TiktokConfig {
    pub access_token: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub access_token: Option<String>,
    pub page_id: Option<String>,
    pub video_api_base: String,
}

#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub access_token: Option<String>,
    pub account_id: Option<String>,
    pub graph_api_base: String,
}

impl TiktokConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }
}

impl FacebookConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.page_id.is_some()
    }
}

impl InstagramConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.account_id.is_some()
    }
}

impl AppConfig {
    /// Lee la configuración del entorno. Las variables vacías se tratan como ausentes.
    pub fn from_env() -> Result<Self> {
        let staging_dir = optional("STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("video_post_service"));

        Ok(AppConfig {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", 5022)?,
            database_path: optional("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data").join("posts.db")),
            staging_dir,
            file_retention: Duration::from_secs(parse_or::<u64>("FILE_RETENTION_HOURS", 24)? * 3600),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 3600)?),
            scheduler_poll_interval: Duration::from_secs(parse_or("SCHEDULER_POLL_SECS", 60)?),
            fetch_timeout: Duration::from_secs(parse_or("FETCH_TIMEOUT_SECS", 300)?),
            publish_timeout: Duration::from_secs(parse_or("PUBLISH_TIMEOUT_SECS", 300)?),
            bootstrap_api_key: optional("BOOTSTRAP_API_KEY"),
            tiktok: TiktokConfig {
                access_token: optional("TIKTOK_ACCESS_TOKEN"),
                api_base: optional("TIKTOK_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TIKTOK_API_BASE.to_string()),
            },
            facebook: FacebookConfig {
                access_token: optional("FACEBOOK_ACCESS_TOKEN"),
                page_id: optional("FACEBOOK_PAGE_ID"),
                video_api_base: optional("FACEBOOK_VIDEO_API_BASE")
                    .unwrap_or_else(|| DEFAULT_GRAPH_VIDEO_BASE.to_string()),
            },
            instagram: InstagramConfig {
                access_token: optional("INSTAGRAM_ACCESS_TOKEN"),
                account_id: optional("INSTAGRAM_ACCOUNT_ID"),
                graph_api_base: optional("INSTAGRAM_GRAPH_API_BASE")
                    .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE.to_string()),
            },
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
