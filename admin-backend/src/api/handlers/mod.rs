// src/api/handlers/mod.rs
pub mod admin_analytics_handler;
