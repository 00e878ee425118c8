// src/api/mod.rs
use crate::service::admin_analytics_service::AdminAnalyticsService;
use std::sync::Arc;

pub mod dto;
pub mod handlers;

/// 統一されたアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub analytics_service: Arc<AdminAnalyticsService>,
}

impl AppState {
    pub fn new(analytics_service: Arc<AdminAnalyticsService>) -> Self {
        Self { analytics_service }
    }
}
