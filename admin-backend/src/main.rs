// src/main.rs
use admin_backend::api::handlers::admin_analytics_handler::admin_analytics_router;
use admin_backend::api::AppState;
use admin_backend::config::AppConfig;
use admin_backend::db::create_db_pool;
use admin_backend::logging::{init_tracing, inject_request_context, logging_middleware};
use admin_backend::repository::data_source::{DataSource, SeaOrmDataSource};
use admin_backend::service::admin_analytics_service::AdminAnalyticsService;
use axum::{middleware, Router};
use migration::{Migrator, MigratorTrait};
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    init_tracing("admin_backend=info,tower_http=info");

    tracing::info!("Starting Admin Backend server...");

    // 設定を読み込む
    let app_config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded: {:?}", app_config.analytics);

    let db_pool = create_db_pool(&app_config).await?;
    tracing::info!("Database pool created successfully.");

    // RUN_MIGRATIONS=true のときだけ起動時にスキーマを適用する
    if env::var("RUN_MIGRATIONS").is_ok_and(|v| v == "true") {
        Migrator::up(&db_pool, None).await?;
        tracing::info!("Database migrations applied.");
    }

    let source: Arc<dyn DataSource> = Arc::new(SeaOrmDataSource::new(db_pool));
    let analytics_service = Arc::new(AdminAnalyticsService::new(
        source,
        app_config.analytics.clone(),
    ));
    let app_state = AppState::new(analytics_service);

    // ルーターの構築
    let app = Router::new()
        .merge(admin_analytics_router(app_state))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(inject_request_context))
        .layer(TraceLayer::new_for_http());

    let addr = app_config.server_addr();
    tracing::info!("Router configured. Server listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
