// src/repository/mod.rs
pub mod data_source;
pub mod metric_query;
