// src/domain/analytics_model.rs

//! 管理画面向けの集計結果（読み取り専用モデル）と派生指標の計算式

use super::period::{Granularity, Period, PeriodPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// 派生指標の計算式
// =============================================================================

/// 前期比の成長率（%）。前期が0以下なら0とする
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        ((current - previous) / previous) * 100.0
    } else {
        0.0
    }
}

/// numerator / denominator をパーセントで返す。分母が0なら0
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (numerator / denominator) * 100.0
    } else {
        0.0
    }
}

/// 5段階評価の平均を 0〜100 の満足度に換算する
pub fn satisfaction_percentage(average_rating: f64) -> f64 {
    average_rating * 20.0
}

// =============================================================================
// ダッシュボード
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeStats {
    pub online_users: u64,
    pub active_projects: u64,
    pub today_revenue: f64,
    pub today_registrations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardKpis {
    pub average_project_value: f64,
    pub customer_satisfaction: f64,
    pub freelancer_retention_rate: f64,
    pub payment_success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub description: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreelancerPerformance {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub completed_projects: u64,
    pub total_earnings: f64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub service_count: u64,
    pub active_projects: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub real_time_stats: RealTimeStats,
    pub kpis: DashboardKpis,
    pub recent_activity: Vec<ActivityEntry>,
    pub top_freelancers: Vec<FreelancerPerformance>,
    pub popular_categories: Vec<PopularCategory>,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// プラットフォーム指標
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub id: Uuid,
    pub name: String,
    pub project_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetrics {
    pub total_freelancers: u64,
    pub total_clients: u64,
    pub active_freelancers: u64,
    pub active_clients: u64,
    pub top_categories: Vec<CategoryShare>,
    pub monthly_revenue: Vec<TimeSeriesPoint>,
}

// =============================================================================
// 期間分析
// =============================================================================

/// 分析対象の指標ファミリー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Revenue,
    Projects,
    Users,
}

impl MetricFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Projects => "projects",
            Self::Users => "users",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(bucket: &Period, value: f64) -> Self {
        Self {
            period_start: bucket.start,
            period_end: bucket.end,
            value,
        }
    }
}

/// 内訳の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BreakdownKind {
    #[serde(rename = "byCategory")]
    Category,
    #[serde(rename = "byPaymentMethod")]
    PaymentMethod,
    #[serde(rename = "byStatus")]
    Status,
    #[serde(rename = "byRole")]
    Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    pub key: String,
    pub label: String,
    pub count: u64,
    pub value: f64,
}

/// 1ファミリー分の期間分析結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAnalytics {
    pub family: MetricFamily,
    pub period: PeriodPair,
    pub granularity: Option<Granularity>,
    pub total: f64,
    pub previous_total: f64,
    pub growth_rate: f64,
    pub average_value: f64,
    pub time_series: Vec<TimeSeriesPoint>,
    pub breakdowns: BTreeMap<BreakdownKind, Vec<BreakdownEntry>>,
}

impl PeriodAnalytics {
    /// 指定した内訳を取り出す（存在しなければ空）
    pub fn take_breakdown(&mut self, kind: BreakdownKind) -> Vec<BreakdownEntry> {
        self.breakdowns.remove(&kind).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopEarner {
    pub id: Uuid,
    pub name: String,
    pub revenue: f64,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalytics {
    pub total_revenue: f64,
    pub previous_revenue: f64,
    pub growth_rate: f64,
    pub average_transaction_value: f64,
    pub time_series: Vec<TimeSeriesPoint>,
    pub by_category: Vec<BreakdownEntry>,
    pub by_payment_method: Vec<BreakdownEntry>,
    pub top_freelancers: Vec<TopEarner>,
    pub period: PeriodPair,
}

impl RevenueAnalytics {
    pub fn from_analytics(mut analytics: PeriodAnalytics, top_freelancers: Vec<TopEarner>) -> Self {
        Self {
            by_category: analytics.take_breakdown(BreakdownKind::Category),
            by_payment_method: analytics.take_breakdown(BreakdownKind::PaymentMethod),
            total_revenue: analytics.total,
            previous_revenue: analytics.previous_total,
            growth_rate: analytics.growth_rate,
            average_transaction_value: analytics.average_value,
            time_series: analytics.time_series,
            top_freelancers,
            period: analytics.period,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnalytics {
    pub total_new_users: u64,
    pub previous_new_users: u64,
    pub growth_rate: f64,
    pub average_daily_registrations: f64,
    pub time_series: Vec<TimeSeriesPoint>,
    pub by_role: Vec<BreakdownEntry>,
    pub by_status: Vec<BreakdownEntry>,
    pub period: PeriodPair,
}

impl From<PeriodAnalytics> for UserAnalytics {
    fn from(mut analytics: PeriodAnalytics) -> Self {
        Self {
            by_role: analytics.take_breakdown(BreakdownKind::Role),
            by_status: analytics.take_breakdown(BreakdownKind::Status),
            total_new_users: analytics.total as u64,
            previous_new_users: analytics.previous_total as u64,
            growth_rate: analytics.growth_rate,
            average_daily_registrations: analytics.average_value,
            time_series: analytics.time_series,
            period: analytics.period,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAnalytics {
    pub total_projects: u64,
    pub previous_projects: u64,
    pub growth_rate: f64,
    pub average_budget: f64,
    pub completion_rate: f64,
    pub time_series: Vec<TimeSeriesPoint>,
    pub by_status: Vec<BreakdownEntry>,
    pub by_category: Vec<BreakdownEntry>,
    pub period: PeriodPair,
}

impl ProjectAnalytics {
    pub fn from_analytics(mut analytics: PeriodAnalytics, completion_rate: f64) -> Self {
        Self {
            by_status: analytics.take_breakdown(BreakdownKind::Status),
            by_category: analytics.take_breakdown(BreakdownKind::Category),
            total_projects: analytics.total as u64,
            previous_projects: analytics.previous_total as u64,
            growth_rate: analytics.growth_rate,
            average_budget: analytics.average_value,
            completion_rate,
            time_series: analytics.time_series,
            period: analytics.period,
        }
    }
}

// =============================================================================
// カテゴリ・売上サマリー
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub id: Uuid,
    pub name: String,
    pub service_count: u64,
    pub project_count: u64,
    pub completed_projects: u64,
    pub completion_rate: f64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub today_revenue: f64,
    pub total_revenue: f64,
}
