// src/api/dto/mod.rs
pub mod analytics_query_dto;
pub mod common;
