// src/service/dashboard_service.rs

use crate::config::AnalyticsConfig;
use crate::domain::analytics_model::{
    percentage, satisfaction_percentage, ActivityEntry, CategoryShare, DashboardKpis,
    DashboardSnapshot, FreelancerPerformance, PlatformMetrics, PopularCategory, RealTimeStats,
    TimeSeriesPoint,
};
use crate::domain::marketplace_status::{
    ProjectStatus, TransactionStatus, TransactionType, UserRole, UserStatus,
};
use crate::domain::period::{Granularity, Period};
use crate::domain::{
    activity_log_model, category_model, project_model, review_model, service_model,
    transaction_model, user_model,
};
use crate::error::AppResult;
use crate::repository::metric_query::{FieldType, MetricQuery, Record, SortDirection};
use crate::service::fan_out_runner::{FanOutRunner, QueryBatch};
use crate::service::period_calculator::start_of_day;
use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use uuid::Uuid;

const TOP_CATEGORY_LIMIT: usize = 5;

/// アクティビティログのアクションコード → 表示用の説明
static ACTION_DESCRIPTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("USER_REGISTERED", "New user registered"),
        ("USER_LOGIN", "User logged in"),
        ("USER_SUSPENDED", "User account suspended"),
        ("USER_ACTIVATED", "User account activated"),
        ("PROFILE_UPDATED", "User profile updated"),
        ("SERVICE_CREATED", "New service listed"),
        ("SERVICE_UPDATED", "Service updated"),
        ("SERVICE_DEACTIVATED", "Service deactivated"),
        ("PROJECT_CREATED", "New project created"),
        ("PROJECT_ACCEPTED", "Project accepted by freelancer"),
        ("PROJECT_STARTED", "Project work started"),
        ("PROJECT_COMPLETED", "Project completed"),
        ("PROJECT_CANCELLED", "Project cancelled"),
        ("PROJECT_DISPUTED", "Project dispute opened"),
        ("PAYMENT_COMPLETED", "Payment completed"),
        ("PAYMENT_FAILED", "Payment failed"),
        ("PAYOUT_SENT", "Payout sent to freelancer"),
        ("REFUND_ISSUED", "Refund issued"),
        ("REVIEW_POSTED", "New review posted"),
        ("CATEGORY_CREATED", "Category created"),
        ("CATEGORY_UPDATED", "Category updated"),
        ("TICKET_OPENED", "Support ticket opened"),
        ("TICKET_RESOLVED", "Support ticket resolved"),
    ])
});

/// 未登録のアクションはコードをそのまま返す
pub fn describe_action(action: &str) -> String {
    ACTION_DESCRIPTIONS
        .get(action)
        .map_or_else(|| action.to_string(), |d| d.to_string())
}

fn completed_payments() -> MetricQuery {
    MetricQuery::sum(transaction_model::Entity, transaction_model::Column::Amount)
        .eq(
            transaction_model::Column::TransactionType,
            TransactionType::Payment.as_str(),
        )
        .eq(
            transaction_model::Column::Status,
            TransactionStatus::Completed.as_str(),
        )
}

/// 完了済み決済の合計。`since` 指定時はその時刻以降のみ
pub fn completed_revenue_query(since: Option<DateTime<Utc>>) -> MetricQuery {
    match since {
        Some(since) => completed_payments().since(transaction_model::Column::CreatedAt, since),
        None => completed_payments(),
    }
}

/// 指定期間の完了済み決済合計
pub fn completed_revenue_within(period: &Period) -> MetricQuery {
    completed_payments().within(transaction_model::Column::CreatedAt, period)
}

fn active_project_statuses() -> Vec<&'static str> {
    ProjectStatus::active().iter().map(|s| s.as_str()).collect()
}

fn full_name(record: &Record) -> AppResult<String> {
    let first = record.text(user_model::Column::FirstName)?;
    let last = record.text(user_model::Column::LastName)?;
    Ok(format!("{} {}", first, last).trim().to_string())
}

/// ダッシュボードのスナップショットとプラットフォーム指標を組み立てる
#[derive(Clone)]
pub struct DashboardMetricsAggregator {
    runner: FanOutRunner,
    config: AnalyticsConfig,
}

impl DashboardMetricsAggregator {
    pub fn new(runner: FanOutRunner, config: AnalyticsConfig) -> Self {
        Self { runner, config }
    }

    pub async fn snapshot(&self) -> AppResult<DashboardSnapshot> {
        self.snapshot_at(Utc::now()).await
    }

    /// 5つの集計を並行に実行する。いずれかが失敗すればスナップショット全体が失敗する
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> AppResult<DashboardSnapshot> {
        let (real_time_stats, kpis, recent_activity, top_freelancers, popular_categories) = tokio::try_join!(
            self.real_time_stats(now),
            self.kpis(now),
            self.recent_activity(),
            self.top_freelancers(),
            self.popular_categories(),
        )?;

        Ok(DashboardSnapshot {
            real_time_stats,
            kpis,
            recent_activity,
            top_freelancers,
            popular_categories,
            generated_at: now,
        })
    }

    pub async fn real_time_stats(&self, now: DateTime<Utc>) -> AppResult<RealTimeStats> {
        let midnight = start_of_day(now);
        let online_since = now - Duration::minutes(self.config.online_window_minutes);

        let batch = QueryBatch::new("dashboard.real_time")
            .add(
                "online_users",
                MetricQuery::count(user_model::Entity)
                    .since(user_model::Column::LastLoginAt, online_since),
            )
            .add(
                "active_projects",
                MetricQuery::count(project_model::Entity)
                    .is_in(project_model::Column::Status, active_project_statuses()),
            )
            .add("today_revenue", completed_revenue_query(Some(midnight)))
            .add(
                "today_registrations",
                MetricQuery::count(user_model::Entity)
                    .since(user_model::Column::CreatedAt, midnight),
            );

        let bag = self.runner.run(batch).await?;

        Ok(RealTimeStats {
            online_users: bag.count("online_users")?,
            active_projects: bag.count("active_projects")?,
            today_revenue: bag.number("today_revenue")?,
            today_registrations: bag.count("today_registrations")?,
        })
    }

    pub async fn kpis(&self, now: DateTime<Utc>) -> AppResult<DashboardKpis> {
        let retention_since = now
            .checked_sub_months(Months::new(self.config.retention_window_months))
            .unwrap_or(now);

        let payments = || {
            MetricQuery::count(transaction_model::Entity).eq(
                transaction_model::Column::TransactionType,
                TransactionType::Payment.as_str(),
            )
        };

        let batch = QueryBatch::new("dashboard.kpis")
            .add(
                "average_project_value",
                MetricQuery::average(project_model::Entity, project_model::Column::Budget)
                    .eq(project_model::Column::Status, ProjectStatus::Completed.as_str()),
            )
            .add(
                "average_rating",
                MetricQuery::average(review_model::Entity, review_model::Column::Rating),
            )
            .add(
                "freelancers",
                MetricQuery::count(user_model::Entity)
                    .eq(user_model::Column::Role, UserRole::Freelancer.as_str()),
            )
            .add(
                "retained_freelancers",
                MetricQuery::group_by(project_model::Entity, [project_model::Column::FreelancerId])
                    .eq(project_model::Column::Status, ProjectStatus::Completed.as_str())
                    .is_not_null(project_model::Column::FreelancerId)
                    .since(project_model::Column::CompletedAt, retention_since),
            )
            .add("payments", payments())
            .add(
                "completed_payments",
                payments().eq(
                    transaction_model::Column::Status,
                    TransactionStatus::Completed.as_str(),
                ),
            );

        let bag = self.runner.run(batch).await?;

        let retained = bag.groups("retained_freelancers")?.len() as f64;

        Ok(DashboardKpis {
            average_project_value: bag.number("average_project_value")?,
            customer_satisfaction: satisfaction_percentage(bag.number("average_rating")?),
            freelancer_retention_rate: percentage(retained, bag.number("freelancers")?),
            payment_success_rate: percentage(
                bag.number("completed_payments")?,
                bag.number("payments")?,
            ),
        })
    }

    /// 新しい順のアクティビティ
    pub async fn recent_activity(&self) -> AppResult<Vec<ActivityEntry>> {
        use activity_log_model::Column;

        let batch = QueryBatch::new("dashboard.recent_activity").add(
            "activity",
            MetricQuery::select(activity_log_model::Entity)
                .column(Column::Id, FieldType::Uuid)
                .column(Column::UserId, FieldType::Uuid)
                .column(Column::Action, FieldType::Text)
                .column(Column::EntityType, FieldType::Text)
                .column(Column::EntityId, FieldType::Uuid)
                .column(Column::CreatedAt, FieldType::Timestamp)
                .order_by(Column::CreatedAt, SortDirection::Desc)
                .order_by(Column::Id, SortDirection::Desc)
                .limit(self.config.recent_activity_limit),
        );

        let bag = self.runner.run(batch).await?;

        bag.records("activity")?
            .iter()
            .map(|record| {
                let action = record.text(Column::Action)?;
                Ok(ActivityEntry {
                    id: record.uuid(Column::Id)?,
                    user_id: record.opt_uuid(Column::UserId)?,
                    description: describe_action(&action),
                    action,
                    entity_type: record.text(Column::EntityType)?,
                    entity_id: record.opt_uuid(Column::EntityId)?,
                    created_at: record.timestamp(Column::CreatedAt)?,
                })
            })
            .collect()
    }

    /// 登録の古い順に選んだアクティブなフリーランサーの実績
    pub async fn top_freelancers(&self) -> AppResult<Vec<FreelancerPerformance>> {
        use user_model::Column;

        let selection = QueryBatch::new("dashboard.top_freelancers").add(
            "freelancers",
            MetricQuery::select(user_model::Entity)
                .column(Column::Id, FieldType::Uuid)
                .column(Column::FirstName, FieldType::Text)
                .column(Column::LastName, FieldType::Text)
                .column(Column::Email, FieldType::Text)
                .eq(Column::Role, UserRole::Freelancer.as_str())
                .eq(Column::Status, UserStatus::Active.as_str())
                .order_by(Column::CreatedAt, SortDirection::Asc)
                .order_by(Column::Id, SortDirection::Asc)
                .limit(self.config.top_freelancer_limit),
        );
        let selected = self.runner.run(selection).await?;
        let freelancers = selected.records("freelancers")?;

        let mut enrichment = QueryBatch::new("dashboard.top_freelancers.enrichment");
        for record in freelancers {
            let id = record.uuid(Column::Id)?;
            enrichment.push(
                format!("{}:completed", id),
                MetricQuery::count(project_model::Entity)
                    .eq(project_model::Column::FreelancerId, id)
                    .eq(project_model::Column::Status, ProjectStatus::Completed.as_str()),
            );
            enrichment.push(
                format!("{}:earnings", id),
                MetricQuery::sum(project_model::Entity, project_model::Column::Budget)
                    .eq(project_model::Column::FreelancerId, id)
                    .eq(project_model::Column::Status, ProjectStatus::Completed.as_str()),
            );
            enrichment.push(
                format!("{}:rating", id),
                MetricQuery::average(review_model::Entity, review_model::Column::Rating)
                    .eq(review_model::Column::RevieweeId, id),
            );
        }
        let metrics = self.runner.run(enrichment).await?;

        freelancers
            .iter()
            .map(|record| {
                let id = record.uuid(Column::Id)?;
                Ok(FreelancerPerformance {
                    id,
                    name: full_name(record)?,
                    email: record.text(Column::Email)?,
                    completed_projects: metrics.count(&format!("{}:completed", id))?,
                    total_earnings: metrics.number(&format!("{}:earnings", id))?,
                    average_rating: metrics.number(&format!("{}:rating", id))?,
                })
            })
            .collect()
    }

    /// アクティブなカテゴリを displayOrder 順に取り、サービス経由で進行中案件数を数える。
    /// 結果は進行中案件数の降順（同数は displayOrder 順のまま）
    pub async fn popular_categories(&self) -> AppResult<Vec<PopularCategory>> {
        use category_model::Column;

        let selection = QueryBatch::new("dashboard.popular_categories").add(
            "categories",
            MetricQuery::select(category_model::Entity)
                .column(Column::Id, FieldType::Uuid)
                .column(Column::Name, FieldType::Text)
                .column(Column::Slug, FieldType::Text)
                .eq(Column::IsActive, true)
                .order_by(Column::DisplayOrder, SortDirection::Asc)
                .order_by(Column::Name, SortDirection::Asc)
                .limit(self.config.popular_category_limit),
        );
        let selected = self.runner.run(selection).await?;
        let categories = selected.records("categories")?;

        let mut services = QueryBatch::new("dashboard.popular_categories.services");
        for record in categories {
            let id = record.uuid(Column::Id)?;
            services.push(
                id.to_string(),
                MetricQuery::select(service_model::Entity)
                    .column(service_model::Column::Id, FieldType::Uuid)
                    .eq(service_model::Column::CategoryId, id),
            );
        }
        let service_bag = self.runner.run(services).await?;

        let mut service_ids: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut projects = QueryBatch::new("dashboard.popular_categories.projects");
        for record in categories {
            let id = record.uuid(Column::Id)?;
            let ids = service_bag
                .records(&id.to_string())?
                .iter()
                .map(|s| s.uuid(service_model::Column::Id))
                .collect::<AppResult<Vec<_>>>()?;
            if !ids.is_empty() {
                projects.push(
                    id.to_string(),
                    MetricQuery::count(project_model::Entity)
                        .is_in(project_model::Column::ServiceId, ids.clone())
                        .is_in(project_model::Column::Status, active_project_statuses()),
                );
            }
            service_ids.insert(id, ids);
        }
        let project_bag = self.runner.run(projects).await?;

        let mut popular = categories
            .iter()
            .map(|record| {
                let id = record.uuid(Column::Id)?;
                let active_projects = if project_bag.contains(&id.to_string()) {
                    project_bag.count(&id.to_string())?
                } else {
                    0
                };
                Ok(PopularCategory {
                    id,
                    name: record.text(Column::Name)?,
                    slug: record.text(Column::Slug)?,
                    service_count: service_ids.get(&id).map_or(0, |ids| ids.len() as u64),
                    active_projects,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        popular.sort_by(|a, b| b.active_projects.cmp(&a.active_projects));
        Ok(popular)
    }

    pub async fn platform_metrics(&self) -> AppResult<PlatformMetrics> {
        self.platform_metrics_at(Utc::now()).await
    }

    /// 会員数・案件の多いカテゴリ・直近12か月の月次売上
    pub async fn platform_metrics_at(&self, now: DateTime<Utc>) -> AppResult<PlatformMetrics> {
        let window_start = now.checked_sub_months(Months::new(12)).unwrap_or(now);
        let months = Period::new(window_start, now)?
            .split(Granularity::Month, self.config.max_time_series_buckets)?;

        let users = |role: UserRole| {
            MetricQuery::count(user_model::Entity).eq(user_model::Column::Role, role.as_str())
        };

        let mut batch = QueryBatch::new("platform_metrics")
            .add("total_freelancers", users(UserRole::Freelancer))
            .add("total_clients", users(UserRole::Client))
            .add(
                "active_freelancers",
                users(UserRole::Freelancer)
                    .eq(user_model::Column::Status, UserStatus::Active.as_str()),
            )
            .add(
                "active_clients",
                users(UserRole::Client).eq(user_model::Column::Status, UserStatus::Active.as_str()),
            )
            .add(
                "projects_by_category",
                MetricQuery::group_by(project_model::Entity, [project_model::Column::CategoryId])
                    .is_not_null(project_model::Column::CategoryId),
            );
        for (i, month) in months.iter().enumerate() {
            batch.push(format!("revenue:{}", i), completed_revenue_within(month));
        }

        let bag = self.runner.run(batch).await?;

        let mut ranked: Vec<(Uuid, u64)> = bag
            .groups("projects_by_category")?
            .iter()
            .filter_map(|row| {
                row.key(0)
                    .and_then(|k| Uuid::parse_str(k).ok())
                    .map(|id| (id, row.count))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(TOP_CATEGORY_LIMIT);

        let names = self
            .category_names(ranked.iter().map(|(id, _)| *id).collect())
            .await?;
        let top_categories = ranked
            .into_iter()
            .map(|(id, project_count)| CategoryShare {
                id,
                name: names.get(&id).cloned().unwrap_or_else(|| id.to_string()),
                project_count,
            })
            .collect();

        let monthly_revenue = months
            .iter()
            .enumerate()
            .map(|(i, month)| {
                Ok(TimeSeriesPoint::new(
                    month,
                    bag.number(&format!("revenue:{}", i))?,
                ))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PlatformMetrics {
            total_freelancers: bag.count("total_freelancers")?,
            total_clients: bag.count("total_clients")?,
            active_freelancers: bag.count("active_freelancers")?,
            active_clients: bag.count("active_clients")?,
            top_categories,
            monthly_revenue,
        })
    }

    async fn category_names(&self, ids: Vec<Uuid>) -> AppResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let batch = QueryBatch::new("platform_metrics.category_names").add(
            "categories",
            MetricQuery::select(category_model::Entity)
                .column(category_model::Column::Id, FieldType::Uuid)
                .column(category_model::Column::Name, FieldType::Text)
                .is_in(category_model::Column::Id, ids),
        );
        let bag = self.runner.run(batch).await?;

        bag.records("categories")?
            .iter()
            .map(|r| {
                Ok((
                    r.uuid(category_model::Column::Id)?,
                    r.text(category_model::Column::Name)?,
                ))
            })
            .collect()
    }
}
