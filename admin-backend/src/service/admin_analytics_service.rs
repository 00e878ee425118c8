// src/service/admin_analytics_service.rs

use crate::config::AnalyticsConfig;
use crate::domain::analytics_model::{
    CategoryPerformance, DashboardSnapshot, MetricFamily, PlatformMetrics, ProjectAnalytics,
    RevenueAnalytics, RevenueSummary, UserAnalytics,
};
use crate::domain::category_tree::CategoryNode;
use crate::domain::period::{Granularity, Period, PeriodPair};
use crate::error::AppResult;
use crate::log_with_context;
use crate::repository::data_source::DataSource;
use crate::service::category_hierarchy_service::CategoryHierarchyBuilder;
use crate::service::dashboard_service::{completed_revenue_query, DashboardMetricsAggregator};
use crate::service::fan_out_runner::{FanOutRunner, QueryBatch};
use crate::service::period_analytics_service::PeriodAnalyticsComposer;
use crate::service::period_calculator::{start_of_day, DefaultSpan, PeriodCalculator};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// 期間分析の呼び出しパラメータ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyticsRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub granularity: Option<Granularity>,
    /// 既定の遡及期間を日数で上書きする
    pub days: Option<i64>,
}

/// 粒度が指定されなかった場合、期間の長さから選ぶ
pub fn default_granularity(period: &Period) -> Granularity {
    let days = period.days();
    if days <= 31.0 {
        Granularity::Day
    } else if days <= 92.0 {
        Granularity::Week
    } else {
        Granularity::Month
    }
}

/// コントローラーに公開する唯一の分析サービス
#[derive(Clone)]
pub struct AdminAnalyticsService {
    runner: FanOutRunner,
    dashboard: DashboardMetricsAggregator,
    period_analytics: PeriodAnalyticsComposer,
    hierarchy: CategoryHierarchyBuilder,
    config: AnalyticsConfig,
}

impl AdminAnalyticsService {
    pub fn new(source: Arc<dyn DataSource>, config: AnalyticsConfig) -> Self {
        let runner = FanOutRunner::new(source, config.max_concurrent_queries);
        Self {
            dashboard: DashboardMetricsAggregator::new(runner.clone(), config.clone()),
            period_analytics: PeriodAnalyticsComposer::new(runner.clone(), config.clone()),
            hierarchy: CategoryHierarchyBuilder::new(runner.clone()),
            runner,
            config,
        }
    }

    fn resolve(&self, range: &AnalyticsRange, now: DateTime<Utc>) -> AppResult<PeriodPair> {
        let span = match range.days {
            Some(days) => DefaultSpan::Days(days),
            None => DefaultSpan::Months(self.config.default_span_months),
        };
        PeriodCalculator::resolve(range.start, range.end, span, now)
    }

    fn completed(operation: &str, started: Instant) {
        log_with_context!(
            tracing::Level::INFO,
            "Admin analytics completed",
            "operation" => operation,
            "elapsed_ms" => started.elapsed().as_millis()
        );
    }

    pub async fn dashboard_metrics(&self) -> AppResult<DashboardSnapshot> {
        let started = Instant::now();
        log_with_context!(
            tracing::Level::INFO,
            "Building dashboard snapshot",
            "operation" => "dashboard_metrics"
        );

        let snapshot = self.dashboard.snapshot().await?;

        Self::completed("dashboard_metrics", started);
        Ok(snapshot)
    }

    pub async fn platform_metrics(&self) -> AppResult<PlatformMetrics> {
        let started = Instant::now();
        log_with_context!(
            tracing::Level::INFO,
            "Building platform metrics",
            "operation" => "platform_metrics"
        );

        let metrics = self.dashboard.platform_metrics().await?;

        Self::completed("platform_metrics", started);
        Ok(metrics)
    }

    pub async fn revenue_analytics(&self, range: AnalyticsRange) -> AppResult<RevenueAnalytics> {
        self.revenue_analytics_at(range, Utc::now()).await
    }

    pub async fn revenue_analytics_at(
        &self,
        range: AnalyticsRange,
        now: DateTime<Utc>,
    ) -> AppResult<RevenueAnalytics> {
        let started = Instant::now();
        let pair = self.resolve(&range, now)?;
        let granularity = range
            .granularity
            .unwrap_or_else(|| default_granularity(&pair.current));
        log_with_context!(
            tracing::Level::INFO,
            "Building revenue analytics",
            "operation" => "revenue_analytics",
            "start" => pair.current.start,
            "end" => pair.current.end,
            "granularity" => granularity
        );

        let (analytics, top_freelancers) = tokio::try_join!(
            self.period_analytics
                .analyze(MetricFamily::Revenue, pair, Some(granularity)),
            self.period_analytics.top_earners(&pair.current),
        )?;

        Self::completed("revenue_analytics", started);
        Ok(RevenueAnalytics::from_analytics(analytics, top_freelancers))
    }

    pub async fn user_analytics(&self, range: AnalyticsRange) -> AppResult<UserAnalytics> {
        self.user_analytics_at(range, Utc::now()).await
    }

    pub async fn user_analytics_at(
        &self,
        range: AnalyticsRange,
        now: DateTime<Utc>,
    ) -> AppResult<UserAnalytics> {
        let started = Instant::now();
        let pair = self.resolve(&range, now)?;
        let granularity = range
            .granularity
            .unwrap_or_else(|| default_granularity(&pair.current));
        log_with_context!(
            tracing::Level::INFO,
            "Building user analytics",
            "operation" => "user_analytics",
            "start" => pair.current.start,
            "end" => pair.current.end,
            "granularity" => granularity
        );

        let analytics = self
            .period_analytics
            .analyze(MetricFamily::Users, pair, Some(granularity))
            .await?;

        Self::completed("user_analytics", started);
        Ok(UserAnalytics::from(analytics))
    }

    pub async fn project_analytics(&self, range: AnalyticsRange) -> AppResult<ProjectAnalytics> {
        self.project_analytics_at(range, Utc::now()).await
    }

    pub async fn project_analytics_at(
        &self,
        range: AnalyticsRange,
        now: DateTime<Utc>,
    ) -> AppResult<ProjectAnalytics> {
        let started = Instant::now();
        let pair = self.resolve(&range, now)?;
        let granularity = range
            .granularity
            .unwrap_or_else(|| default_granularity(&pair.current));
        log_with_context!(
            tracing::Level::INFO,
            "Building project analytics",
            "operation" => "project_analytics",
            "start" => pair.current.start,
            "end" => pair.current.end,
            "granularity" => granularity
        );

        let (analytics, completion_rate) = tokio::try_join!(
            self.period_analytics
                .analyze(MetricFamily::Projects, pair, Some(granularity)),
            self.period_analytics.completion_rate(&pair.current),
        )?;

        Self::completed("project_analytics", started);
        Ok(ProjectAnalytics::from_analytics(analytics, completion_rate))
    }

    pub async fn category_hierarchy(&self) -> AppResult<Vec<CategoryNode>> {
        let started = Instant::now();
        log_with_context!(
            tracing::Level::INFO,
            "Building category hierarchy",
            "operation" => "category_hierarchy"
        );

        let tree = self.hierarchy.build_tree().await?;

        Self::completed("category_hierarchy", started);
        Ok(tree)
    }

    pub async fn category_performance(&self, category_id: Uuid) -> AppResult<CategoryPerformance> {
        let started = Instant::now();
        log_with_context!(
            tracing::Level::INFO,
            "Building category performance",
            "operation" => "category_performance",
            "category_id" => category_id
        );

        let performance = self.hierarchy.category_performance(category_id).await?;

        Self::completed("category_performance", started);
        Ok(performance)
    }

    /// 当日 0:00 (UTC) 以降の完了済み決済の合計
    pub async fn today_revenue(&self) -> AppResult<f64> {
        let started = Instant::now();
        let midnight = start_of_day(Utc::now());
        log_with_context!(
            tracing::Level::INFO,
            "Summing today's revenue",
            "operation" => "today_revenue",
            "since" => midnight
        );

        let bag = self
            .runner
            .run(QueryBatch::new("revenue.today").add("revenue", completed_revenue_query(Some(midnight))))
            .await?;

        Self::completed("today_revenue", started);
        bag.number("revenue")
    }

    /// 全期間の完了済み決済の合計
    pub async fn total_revenue(&self) -> AppResult<f64> {
        let started = Instant::now();
        log_with_context!(
            tracing::Level::INFO,
            "Summing total revenue",
            "operation" => "total_revenue"
        );

        let bag = self
            .runner
            .run(QueryBatch::new("revenue.total").add("revenue", completed_revenue_query(None)))
            .await?;

        Self::completed("total_revenue", started);
        bag.number("revenue")
    }

    pub async fn revenue_summary(&self) -> AppResult<RevenueSummary> {
        self.revenue_summary_at(Utc::now()).await
    }

    pub async fn revenue_summary_at(&self, now: DateTime<Utc>) -> AppResult<RevenueSummary> {
        let started = Instant::now();
        let midnight = start_of_day(now);
        log_with_context!(
            tracing::Level::INFO,
            "Building revenue summary",
            "operation" => "revenue_summary",
            "since" => midnight
        );

        let batch = QueryBatch::new("revenue.summary")
            .add("today", completed_revenue_query(Some(midnight)))
            .add("total", completed_revenue_query(None));
        let bag = self.runner.run(batch).await?;

        Self::completed("revenue_summary", started);
        Ok(RevenueSummary {
            today_revenue: bag.number("today")?,
            total_revenue: bag.number("total")?,
        })
    }
}
