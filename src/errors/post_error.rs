//! errors/post_error.rs
//! Taxonomía de errores del ciclo de vida de un post.

use thiserror::Error;

use crate::models::post_model::Platform;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// La descarga del video falló (red, timeout o respuesta no-2xx).
    #[error("could not fetch media: {0}")]
    FetchError(String),

    /// Token expirado, inválido o sin configurar. El usuario debe reconectar.
    #[error("{platform} rejected the credentials: {message}")]
    AuthError { platform: Platform, message: String },

    #[error("{platform} is throttling requests (retry after {})", retry_hint(.retry_after))]
    RateLimited {
        platform: Platform,
        retry_after: Option<u64>,
    },

    #[error("{platform} returned an error: {message}")]
    RemoteError { platform: Platform, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("{}s", secs),
        None => "an unspecified delay".to_string(),
    }
}

impl PostError {
    /// Nombre estable de la categoría, usado como prefijo de `error_detail`.
    pub fn category(&self) -> &'static str {
        match self {
            PostError::NotFound(_) => "NotFound",
            PostError::InvalidState(_) => "InvalidState",
            PostError::InvalidRequest(_) => "InvalidRequest",
            PostError::Unauthorized(_) => "Unauthorized",
            PostError::FetchError(_) => "FetchError",
            PostError::AuthError { .. } => "AuthError",
            PostError::RateLimited { .. } => "RateLimited",
            PostError::RemoteError { .. } => "RemoteError",
            PostError::Database(_) => "DatabaseError",
            PostError::Io(_) => "IoError",
        }
    }

    /// Mensaje legible para guardar en `error_detail`.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.category(), self)
    }

    /// Errores que vienen de la plataforma remota o de la descarga del medio.
    /// Son definitivos para el intento de publicación.
    pub fn is_publish_failure(&self) -> bool {
        matches!(
            self,
            PostError::FetchError(_)
                | PostError::AuthError { .. }
                | PostError::RateLimited { .. }
                | PostError::RemoteError { .. }
        )
    }
}
