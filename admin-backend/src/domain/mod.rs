// src/domain/mod.rs
pub mod activity_log_model;
pub mod analytics_model;
pub mod category_model;
pub mod category_tree;
pub mod marketplace_status;
pub mod period;
pub mod project_model;
pub mod review_model;
pub mod service_model;
pub mod transaction_model;
pub mod user_model;
