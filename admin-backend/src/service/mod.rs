// src/service/mod.rs
pub mod admin_analytics_service;
pub mod category_hierarchy_service;
pub mod dashboard_service;
pub mod fan_out_runner;
pub mod period_analytics_service;
pub mod period_calculator;
