// src/api/dto/analytics_query_dto.rs

use crate::domain::period::Granularity;
use crate::error::AppResult;
use crate::service::admin_analytics_service::AnalyticsRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 期間分析のクエリパラメータ（`?start&end&granularity&days`）
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AnalyticsPeriodQuery {
    /// RFC 3339
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// day | week | month
    pub granularity: Option<String>,
    #[validate(range(min = 1, max = 365, message = "Days must be between 1 and 365"))]
    pub days: Option<i64>,
}

impl AnalyticsPeriodQuery {
    /// 粒度の文字列を解釈してサービス層の範囲指定に変換する
    pub fn into_range(self) -> AppResult<AnalyticsRange> {
        let granularity = self
            .granularity
            .as_deref()
            .map(str::parse::<Granularity>)
            .transpose()?;

        Ok(AnalyticsRange {
            start: self.start,
            end: self.end,
            granularity,
            days: self.days,
        })
    }
}
