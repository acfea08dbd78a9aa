//! errors/mod.rs
//! Errores de dominio compartidos por servicios y handlers.

pub mod post_error;

pub use post_error::PostError;
