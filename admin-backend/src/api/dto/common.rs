// src/api/dto/common.rs

use serde::{Deserialize, Serialize};

/// 統一API成功レスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    /// 成功レスポンスを作成
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            metadata: None,
        }
    }

    /// メタデータ付き成功レスポンスを作成
    pub fn success_with_metadata(
        message: impl Into<String>,
        data: T,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            metadata: Some(metadata),
        }
    }
}
