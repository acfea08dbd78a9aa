//! config/mod.rs
//! Configuración de la aplicación (leída de variables de entorno / .env).

pub mod app_config;
