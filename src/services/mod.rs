//! services/mod.rs
//! Capas de negocio: ciclo de vida del post, staging, publishers y cola diferida.

pub mod api_key_service;
pub mod file_stager;
pub mod post_service;
pub mod publish_service;
pub mod publisher;
pub mod scheduler_service;
