//! tests/mod.rs
//! Pruebas de integración sobre SQLite temporal y APIs simuladas.

mod support;

mod publish_tests;
