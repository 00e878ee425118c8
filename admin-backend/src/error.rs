// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// データソースに到達できない、またはステートメントの実行に失敗した
    #[error("Data source unavailable: {0}")]
    DataSourceUnavailable(String),

    /// 集計クエリの定義が不正（プログラミングエラー）
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// 呼び出し側の期間指定が不正
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Multiple validation errors")]
    ValidationErrors(Vec<String>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// ログ・レスポンス用のエラー種別
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::DataSourceUnavailable(_) => "data_source_unavailable",
            AppError::InvalidQuery(_) => "invalid_query",
            AppError::InvalidPeriod(_) => "invalid_period",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationErrors(_) => "validation_errors",
            AppError::BadRequest(_) => "bad_request",
            AppError::InternalServerError(_) => "internal_server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DataSourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidQuery(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::InvalidPeriod(_)
            | AppError::ValidationErrors(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

// DbErrは接続系とデコード系で分類する
impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Type(msg) | DbErr::Json(msg) => AppError::InvalidQuery(msg),
            DbErr::TryIntoErr { from, into, .. } => {
                AppError::InvalidQuery(format!("cannot convert {} into {}", from, into))
            }
            other => AppError::DataSourceUnavailable(other.to_string()),
        }
    }
}

// axum でエラーをHTTPレスポンスに変換するための実装
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type().to_string();

        let error_response = match self {
            AppError::DataSourceUnavailable(message) => {
                tracing::error!(error = %message, "Data source unavailable");
                ErrorResponse {
                    success: false,
                    error: "The analytics data source is unavailable".to_string(),
                    message: "The analytics data source is unavailable".to_string(),
                    details: Some(json!({ "hint": "Check database connection" })),
                    validation_errors: None,
                    errors: None,
                    error_type,
                }
            }
            AppError::InvalidQuery(message) => {
                // クエリ定義の不備はサーバー側の問題なので詳細は返さない
                tracing::error!(error = %message, "Invalid aggregate query");
                ErrorResponse {
                    success: false,
                    error: "An internal server error occurred".to_string(),
                    message: "An internal server error occurred".to_string(),
                    details: None,
                    validation_errors: None,
                    errors: None,
                    error_type,
                }
            }
            AppError::InvalidPeriod(message)
            | AppError::NotFound(message)
            | AppError::BadRequest(message) => ErrorResponse {
                success: false,
                error: message.clone(),
                message,
                details: None,
                validation_errors: None,
                errors: None,
                error_type,
            },
            AppError::ValidationErrors(errors) => {
                let mut field_errors = HashMap::new();
                for error in &errors {
                    if let Some((field, message)) = error.split_once(": ") {
                        field_errors
                            .entry(field.to_string())
                            .or_insert_with(Vec::new)
                            .push(message.to_string());
                    }
                }
                let errors_array: Vec<serde_json::Value> =
                    errors.iter().map(|e| json!({"message": e})).collect();
                ErrorResponse {
                    success: false,
                    error: "Validation failed".to_string(),
                    message: "Validation failed".to_string(),
                    details: None,
                    validation_errors: Some(field_errors),
                    errors: Some(errors_array),
                    error_type,
                }
            }
            AppError::InternalServerError(message) => {
                tracing::error!(error = %message, "Internal server error");
                ErrorResponse {
                    success: false,
                    error: "An internal server error occurred".to_string(),
                    message: "An internal server error occurred".to_string(),
                    details: None,
                    validation_errors: None,
                    errors: None,
                    error_type,
                }
            }
        };

        (status, Json(error_response)).into_response()
    }
}

// Result 型のエイリアス
pub type AppResult<T> = Result<T, AppError>;

/// 統一的なエラーレスポンス構造
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<HashMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<serde_json::Value>>,
    pub error_type: String,
}
