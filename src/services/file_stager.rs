//! services/file_stager.rs
//! Descarga temporal de videos. Ningún archivo sobrevive al intento de
//! publicación: se borra al terminar (éxito o error) y, si el proceso muere a
//! mitad de camino, el barrido periódico lo elimina después.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tempfile::{Builder, TempPath};
use tokio::io::AsyncWriteExt;

use crate::errors::PostError;

const STAGED_SUFFIX: &str = ".mp4";

#[derive(Clone)]
pub struct FileStager {
    http_client: Client,
    staging_dir: Arc<PathBuf>,
    retention: Duration,
}

/// Archivo descargado, propiedad exclusiva de un intento de publicación.
/// `release` lo borra; si nunca se llega a llamar, `Drop` lo borra igual.
pub struct StagedFile {
    path: TempPath,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn release(self) -> std::io::Result<()> {
        let display = self.path.display().to_string();
        self.path.close()?;
        log::info!("(release) Archivo temporal eliminado: {}", display);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagingStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub staging_dir: String,
    pub retention_hours: u64,
}

impl FileStager {
    pub fn new(staging_dir: PathBuf, retention: Duration, fetch_timeout: Duration) -> Result<Self, PostError> {
        std::fs::create_dir_all(&staging_dir)?;
        let http_client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| PostError::FetchError(format!("could not build http client: {}", e)))?;

        Ok(Self {
            http_client,
            staging_dir: Arc::new(staging_dir),
            retention,
        })
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Descarga `video_url` a `<staging_dir>/<post_id>_<random>.mp4`.
    /// Sin reintentos: la política de reintento es del llamador.
    pub async fn stage(&self, post_id: &str, video_url: &str) -> Result<StagedFile, PostError> {
        log::info!("(stage) Descargando video del post {}", post_id);

        let response = self
            .http_client
            .get(video_url)
            .send()
            .await
            .map_err(|e| PostError::FetchError(format!("request to {} failed: {}", video_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostError::FetchError(format!(
                "{} answered with status {}",
                video_url, status
            )));
        }

        // El TempPath se crea antes de escribir: si algo falla a mitad, se borra al salir.
        let named = Builder::new()
            .prefix(&format!("{}_", post_id))
            .suffix(STAGED_SUFFIX)
            .tempfile_in(self.staging_dir.as_path())?;
        let (std_file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut size: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| PostError::FetchError(format!("download of {} interrupted: {}", video_url, e)))?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if size == 0 {
            return Err(PostError::FetchError(format!("{} returned an empty body", video_url)));
        }

        log::info!(
            "(stage) Video del post {} guardado en {} ({} bytes)",
            post_id,
            path.display(),
            size
        );
        Ok(StagedFile { path, size })
    }

    /// Adquisición con alcance: descarga, ejecuta `f` con la ruta local y
    /// borra el archivo antes de devolver el resultado de `f`, sea cual sea.
    pub async fn with_staged<F, Fut, T>(
        &self,
        post_id: &str,
        video_url: &str,
        f: F,
    ) -> Result<T, PostError>
    where
        F: FnOnce(PathBuf, u64) -> Fut,
        Fut: Future<Output = Result<T, PostError>>,
    {
        let staged = self.stage(post_id, video_url).await?;
        let result = f(staged.path().to_path_buf(), staged.size()).await;

        if let Err(e) = staged.release() {
            // El Drop ya no corre tras close(); el barrido lo recogerá.
            log::error!(
                "(with_staged) No se pudo borrar el archivo temporal del post {}: {}",
                post_id,
                e
            );
        }

        result
    }

    /// Borra los archivos del directorio temporal más viejos que `max_age`.
    /// Devuelve cuántos se borraron.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize, PostError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut cleaned = 0;

        let mut entries = tokio::fs::read_dir(self.staging_dir.as_path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("(sweep) No se pudo leer {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified <= cutoff {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => cleaned += 1,
                    Err(e) => log::error!("(sweep) Error borrando {:?}: {}", entry.path(), e),
                }
            }
        }

        if cleaned > 0 {
            log::info!("(sweep) Se borraron {} archivos temporales viejos", cleaned);
        }
        Ok(cleaned)
    }

    pub async fn stats(&self) -> Result<StagingStats, PostError> {
        let mut total_files = 0;
        let mut total_size_bytes = 0;

        let mut entries = tokio::fs::read_dir(self.staging_dir.as_path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                total_files += 1;
                total_size_bytes += metadata.len();
            }
        }

        Ok(StagingStats {
            total_files,
            total_size_bytes,
            staging_dir: self.staging_dir.display().to_string(),
            retention_hours: self.retention.as_secs() / 3600,
        })
    }
}

/// Barrido periódico de seguridad (por si un crash saltó el borrado normal).
pub fn spawn_retention_sweep(stager: FileStager, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = stager.sweep(stager.retention()).await {
                log::error!("(spawn_retention_sweep) Error en barrido: {}", e);
            }
        }
    })
}
