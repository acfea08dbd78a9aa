//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod api_key_model;
pub mod post_model;
pub mod publish_model;
pub mod schedule_model;
