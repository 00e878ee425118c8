// src/api/handlers/admin_analytics_handler.rs

use crate::api::dto::analytics_query_dto::AnalyticsPeriodQuery;
use crate::api::dto::common::ApiResponse;
use crate::api::AppState;
use crate::domain::analytics_model::{
    CategoryPerformance, DashboardSnapshot, PlatformMetrics, ProjectAnalytics, RevenueAnalytics,
    RevenueSummary, UserAnalytics,
};
use crate::domain::category_tree::CategoryNode;
use crate::error::{AppError, AppResult};
use crate::utils::error_helper::convert_validation_errors;
use axum::{
    extract::{FromRequestParts, Json, Path, Query, State},
    http::request::Parts,
    routing::get,
    Router,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// UUID パス抽出器。不正な形式は共通のエラーレスポンスで返す
pub struct UuidPath(pub Uuid);

impl<S> FromRequestParts<S> for UuidPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(path_str) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid path parameter".to_string()))?;

        let uuid = Uuid::parse_str(&path_str)
            .map_err(|_| AppError::BadRequest(format!("Invalid UUID format: '{}'", path_str)))?;

        Ok(UuidPath(uuid))
    }
}

// --- Handler Functions ---

/// ダッシュボードのスナップショット
pub async fn dashboard_metrics_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<DashboardSnapshot>>> {
    let snapshot = app_state.analytics_service.dashboard_metrics().await?;

    Ok(Json(ApiResponse::success(
        "Dashboard metrics retrieved successfully",
        snapshot,
    )))
}

/// 会員数・カテゴリ別案件数・月次売上
pub async fn platform_metrics_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<PlatformMetrics>>> {
    let metrics = app_state.analytics_service.platform_metrics().await?;

    Ok(Json(ApiResponse::success(
        "Platform metrics retrieved successfully",
        metrics,
    )))
}

pub async fn revenue_analytics_handler(
    State(app_state): State<AppState>,
    Query(query): Query<AnalyticsPeriodQuery>,
) -> AppResult<Json<ApiResponse<RevenueAnalytics>>> {
    query
        .validate()
        .map_err(|e| convert_validation_errors(e, "admin_analytics::revenue_analytics"))?;
    info!(
        start = ?query.start,
        end = ?query.end,
        granularity = ?query.granularity,
        "Revenue analytics requested"
    );

    let analytics = app_state
        .analytics_service
        .revenue_analytics(query.into_range()?)
        .await?;

    Ok(Json(ApiResponse::success(
        "Revenue analytics retrieved successfully",
        analytics,
    )))
}

pub async fn user_analytics_handler(
    State(app_state): State<AppState>,
    Query(query): Query<AnalyticsPeriodQuery>,
) -> AppResult<Json<ApiResponse<UserAnalytics>>> {
    query
        .validate()
        .map_err(|e| convert_validation_errors(e, "admin_analytics::user_analytics"))?;

    let analytics = app_state
        .analytics_service
        .user_analytics(query.into_range()?)
        .await?;

    Ok(Json(ApiResponse::success(
        "User analytics retrieved successfully",
        analytics,
    )))
}

pub async fn project_analytics_handler(
    State(app_state): State<AppState>,
    Query(query): Query<AnalyticsPeriodQuery>,
) -> AppResult<Json<ApiResponse<ProjectAnalytics>>> {
    query
        .validate()
        .map_err(|e| convert_validation_errors(e, "admin_analytics::project_analytics"))?;

    let analytics = app_state
        .analytics_service
        .project_analytics(query.into_range()?)
        .await?;

    Ok(Json(ApiResponse::success(
        "Project analytics retrieved successfully",
        analytics,
    )))
}

/// 3階層のカテゴリツリー
pub async fn category_hierarchy_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<CategoryNode>>>> {
    let tree = app_state.analytics_service.category_hierarchy().await?;
    let roots = tree.len();

    Ok(Json(ApiResponse::success_with_metadata(
        "Category hierarchy retrieved successfully",
        tree,
        json!({ "rootCount": roots }),
    )))
}

pub async fn category_performance_handler(
    State(app_state): State<AppState>,
    UuidPath(category_id): UuidPath,
) -> AppResult<Json<ApiResponse<CategoryPerformance>>> {
    let performance = app_state
        .analytics_service
        .category_performance(category_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Category performance retrieved successfully",
        performance,
    )))
}

pub async fn revenue_summary_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<RevenueSummary>>> {
    let summary = app_state.analytics_service.revenue_summary().await?;

    Ok(Json(ApiResponse::success(
        "Revenue summary retrieved successfully",
        summary,
    )))
}

// --- ルーター ---

/// 管理者向け分析ルーターを作成
pub fn admin_analytics_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/admin/analytics/dashboard-metrics",
            get(dashboard_metrics_handler),
        )
        .route(
            "/admin/analytics/platform-metrics",
            get(platform_metrics_handler),
        )
        .route(
            "/admin/analytics/revenue-analytics",
            get(revenue_analytics_handler),
        )
        .route("/admin/analytics/user-analytics", get(user_analytics_handler))
        .route(
            "/admin/analytics/project-analytics",
            get(project_analytics_handler),
        )
        .route(
            "/admin/analytics/category-hierarchy",
            get(category_hierarchy_handler),
        )
        .route(
            "/admin/analytics/categories/{id}/performance",
            get(category_performance_handler),
        )
        .route(
            "/admin/analytics/revenue-summary",
            get(revenue_summary_handler),
        )
        .with_state(app_state)
}
