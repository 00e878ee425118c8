// src/service/period_analytics_service.rs

use crate::config::AnalyticsConfig;
use crate::domain::analytics_model::{
    growth_rate, percentage, BreakdownEntry, BreakdownKind, MetricFamily, PeriodAnalytics,
    TimeSeriesPoint, TopEarner,
};
use crate::domain::marketplace_status::ProjectStatus;
use crate::domain::period::{Granularity, Period, PeriodPair};
use crate::domain::{category_model, project_model, transaction_model, user_model};
use crate::error::AppResult;
use crate::repository::metric_query::{FieldType, GroupRow, MetricQuery};
use crate::service::dashboard_service::completed_revenue_within;
use crate::service::fan_out_runner::{FanOutRunner, MetricBag, QueryBatch};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const UNASSIGNED_KEY: &str = "unassigned";
const UNASSIGNED_LABEL: &str = "Uncategorized";

fn breakdown_name(kind: BreakdownKind) -> String {
    format!("breakdown:{:?}", kind)
}

fn bucket_name(index: usize) -> String {
    format!("bucket:{}", index)
}

/// グループ行を内訳に変換する。値の降順、同値はキー順
fn to_breakdown(rows: &[GroupRow]) -> Vec<BreakdownEntry> {
    let mut entries: Vec<BreakdownEntry> = rows
        .iter()
        .map(|row| {
            let key = row.key(0).unwrap_or(UNASSIGNED_KEY).to_string();
            BreakdownEntry {
                label: key.clone(),
                key,
                count: row.count,
                value: row.value,
            }
        })
        .collect();
    sort_breakdown(&mut entries);
    entries
}

fn sort_breakdown(entries: &mut [BreakdownEntry]) {
    entries.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// 指標ファミリーごとの前期比・時系列・内訳を組み立てる
#[derive(Clone)]
pub struct PeriodAnalyticsComposer {
    runner: FanOutRunner,
    config: AnalyticsConfig,
}

impl PeriodAnalyticsComposer {
    pub fn new(runner: FanOutRunner, config: AnalyticsConfig) -> Self {
        Self { runner, config }
    }

    /// ファミリーの合計を取るクエリ
    fn total_query(family: MetricFamily, period: &Period) -> MetricQuery {
        match family {
            MetricFamily::Revenue => completed_revenue_within(period),
            MetricFamily::Projects => MetricQuery::count(project_model::Entity)
                .within(project_model::Column::CreatedAt, period),
            MetricFamily::Users => {
                MetricQuery::count(user_model::Entity).within(user_model::Column::CreatedAt, period)
            }
        }
    }

    /// ファミリーの平均値を取るクエリ。ユーザーは日次登録数として後で計算する
    fn average_query(family: MetricFamily, period: &Period) -> Option<MetricQuery> {
        match family {
            MetricFamily::Revenue => Some(completed_revenue_within(period).averaged()),
            MetricFamily::Projects => Some(
                MetricQuery::average(project_model::Entity, project_model::Column::Budget)
                    .within(project_model::Column::CreatedAt, period),
            ),
            MetricFamily::Users => None,
        }
    }

    /// 単一の group-by で求まる内訳
    fn breakdown_queries(
        family: MetricFamily,
        period: &Period,
    ) -> Vec<(BreakdownKind, MetricQuery)> {
        match family {
            MetricFamily::Revenue => vec![
                (
                    BreakdownKind::PaymentMethod,
                    completed_revenue_within(period)
                        .grouped_by([transaction_model::Column::PaymentMethod]),
                ),
                (
                    BreakdownKind::Category,
                    completed_revenue_within(period)
                        .grouped_by([transaction_model::Column::ProjectId]),
                ),
            ],
            MetricFamily::Projects => vec![
                (
                    BreakdownKind::Status,
                    MetricQuery::group_by(project_model::Entity, [project_model::Column::Status])
                        .within(project_model::Column::CreatedAt, period),
                ),
                (
                    BreakdownKind::Category,
                    MetricQuery::group_by(
                        project_model::Entity,
                        [project_model::Column::CategoryId],
                    )
                    .within(project_model::Column::CreatedAt, period),
                ),
            ],
            MetricFamily::Users => vec![
                (
                    BreakdownKind::Role,
                    MetricQuery::group_by(user_model::Entity, [user_model::Column::Role])
                        .within(user_model::Column::CreatedAt, period),
                ),
                (
                    BreakdownKind::Status,
                    MetricQuery::group_by(user_model::Entity, [user_model::Column::Status])
                        .within(user_model::Column::CreatedAt, period),
                ),
            ],
        }
    }

    /// 現在期間・比較期間の集計、時系列、内訳を1バッチで取得して組み立てる
    pub async fn analyze(
        &self,
        family: MetricFamily,
        pair: PeriodPair,
        granularity: Option<Granularity>,
    ) -> AppResult<PeriodAnalytics> {
        let buckets = match granularity {
            Some(g) => pair
                .current
                .split(g, self.config.max_time_series_buckets)?,
            None => Vec::new(),
        };

        let mut batch = QueryBatch::new(format!("period_analytics.{}", family.as_str()))
            .add("current", Self::total_query(family, &pair.current))
            .add("previous", Self::total_query(family, &pair.previous));
        if let Some(average) = Self::average_query(family, &pair.current) {
            batch.push("average", average);
        }
        for (i, bucket) in buckets.iter().enumerate() {
            batch.push(bucket_name(i), Self::total_query(family, bucket));
        }
        let breakdown_queries = Self::breakdown_queries(family, &pair.current);
        for (kind, query) in &breakdown_queries {
            batch.push(breakdown_name(*kind), query.clone());
        }

        let bag = self.runner.run(batch).await?;

        let total = bag.number("current")?;
        let previous_total = bag.number("previous")?;
        let average_value = match family {
            MetricFamily::Users => {
                let days = pair.current.days();
                if days > 0.0 {
                    total / days
                } else {
                    0.0
                }
            }
            _ => bag.number("average")?,
        };

        let time_series = buckets
            .iter()
            .enumerate()
            .map(|(i, bucket)| Ok(TimeSeriesPoint::new(bucket, bag.number(&bucket_name(i))?)))
            .collect::<AppResult<Vec<_>>>()?;

        let mut breakdowns = BTreeMap::new();
        for (kind, _) in &breakdown_queries {
            let entries = self.resolve_breakdown(family, *kind, &bag).await?;
            breakdowns.insert(*kind, entries);
        }

        Ok(PeriodAnalytics {
            family,
            period: pair,
            granularity,
            total,
            previous_total,
            growth_rate: growth_rate(total, previous_total),
            average_value,
            time_series,
            breakdowns,
        })
    }

    async fn resolve_breakdown(
        &self,
        family: MetricFamily,
        kind: BreakdownKind,
        bag: &MetricBag,
    ) -> AppResult<Vec<BreakdownEntry>> {
        let rows = bag.groups(&breakdown_name(kind))?;
        match (family, kind) {
            (MetricFamily::Revenue, BreakdownKind::Category) => {
                self.revenue_by_category(rows).await
            }
            (_, BreakdownKind::Category) => {
                let mut entries = to_breakdown(rows);
                self.label_categories(&mut entries).await?;
                Ok(entries)
            }
            _ => Ok(to_breakdown(rows)),
        }
    }

    /// 決済の案件別合計を案件のカテゴリに振り分ける
    async fn revenue_by_category(&self, by_project: &[GroupRow]) -> AppResult<Vec<BreakdownEntry>> {
        let project_ids: Vec<Uuid> = by_project
            .iter()
            .filter_map(|row| row.key(0).and_then(|k| Uuid::parse_str(k).ok()))
            .collect();

        let mut project_category: HashMap<Uuid, Option<Uuid>> = HashMap::new();
        if !project_ids.is_empty() {
            let batch = QueryBatch::new("period_analytics.revenue.project_categories").add(
                "projects",
                MetricQuery::select(project_model::Entity)
                    .column(project_model::Column::Id, FieldType::Uuid)
                    .column(project_model::Column::CategoryId, FieldType::Uuid)
                    .is_in(project_model::Column::Id, project_ids),
            );
            let bag = self.runner.run(batch).await?;
            for record in bag.records("projects")? {
                project_category.insert(
                    record.uuid(project_model::Column::Id)?,
                    record.opt_uuid(project_model::Column::CategoryId)?,
                );
            }
        }

        let mut totals: BTreeMap<String, (u64, f64)> = BTreeMap::new();
        for row in by_project {
            let category = row
                .key(0)
                .and_then(|k| Uuid::parse_str(k).ok())
                .and_then(|project_id| project_category.get(&project_id).copied().flatten());
            let key = category.map_or_else(|| UNASSIGNED_KEY.to_string(), |id| id.to_string());
            let entry = totals.entry(key).or_insert((0, 0.0));
            entry.0 += row.count;
            entry.1 += row.value;
        }

        let mut entries: Vec<BreakdownEntry> = totals
            .into_iter()
            .map(|(key, (count, value))| BreakdownEntry {
                label: key.clone(),
                key,
                count,
                value,
            })
            .collect();
        self.label_categories(&mut entries).await?;
        sort_breakdown(&mut entries);
        Ok(entries)
    }

    /// カテゴリIDのキーに名前のラベルを付ける
    async fn label_categories(&self, entries: &mut [BreakdownEntry]) -> AppResult<()> {
        let ids: Vec<Uuid> = entries
            .iter()
            .filter_map(|e| Uuid::parse_str(&e.key).ok())
            .collect();
        let names = self.category_names(ids).await?;

        for entry in entries.iter_mut() {
            if entry.key == UNASSIGNED_KEY {
                entry.label = UNASSIGNED_LABEL.to_string();
            } else if let Some(name) = Uuid::parse_str(&entry.key)
                .ok()
                .and_then(|id| names.get(&id))
            {
                entry.label = name.clone();
            }
        }
        Ok(())
    }

    async fn category_names(&self, ids: Vec<Uuid>) -> AppResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let batch = QueryBatch::new("period_analytics.category_names").add(
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

    /// 期間内に作成された案件のうち完了したものの割合（%）
    pub async fn completion_rate(&self, period: &Period) -> AppResult<f64> {
        let created = || {
            MetricQuery::count(project_model::Entity)
                .within(project_model::Column::CreatedAt, period)
        };
        let batch = QueryBatch::new("period_analytics.completion_rate")
            .add("created", created())
            .add(
                "completed",
                created().eq(project_model::Column::Status, ProjectStatus::Completed.as_str()),
            );
        let bag = self.runner.run(batch).await?;

        Ok(percentage(
            bag.number("completed")?,
            bag.number("created")?,
        ))
    }

    /// 期間内の完了済み決済の受取額が多いフリーランサー
    pub async fn top_earners(&self, period: &Period) -> AppResult<Vec<TopEarner>> {
        let by_payee = completed_revenue_within(period)
            .grouped_by([transaction_model::Column::PayeeId])
            .is_not_null(transaction_model::Column::PayeeId);

        let bag = self
            .runner
            .run(QueryBatch::new("revenue.top_earners").add("payees", by_payee))
            .await?;

        let mut ranked: Vec<(Uuid, u64, f64)> = bag
            .groups("payees")?
            .iter()
            .filter_map(|row| {
                row.key(0)
                    .and_then(|k| Uuid::parse_str(k).ok())
                    .map(|id| (id, row.count, row.value))
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(self.config.top_freelancer_limit as usize);

        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let names_batch = QueryBatch::new("revenue.top_earners.names").add(
            "users",
            MetricQuery::select(user_model::Entity)
                .column(user_model::Column::Id, FieldType::Uuid)
                .column(user_model::Column::FirstName, FieldType::Text)
                .column(user_model::Column::LastName, FieldType::Text)
                .is_in(
                    user_model::Column::Id,
                    ranked.iter().map(|(id, _, _)| *id).collect::<Vec<_>>(),
                ),
        );
        let names_bag = self.runner.run(names_batch).await?;
        let mut names = HashMap::new();
        for record in names_bag.records("users")? {
            let first = record.text(user_model::Column::FirstName)?;
            let last = record.text(user_model::Column::LastName)?;
            names.insert(
                record.uuid(user_model::Column::Id)?,
                format!("{} {}", first, last).trim().to_string(),
            );
        }

        Ok(ranked
            .into_iter()
            .map(|(id, transaction_count, revenue)| TopEarner {
                id,
                name: names.remove(&id).unwrap_or_else(|| id.to_string()),
                revenue,
                transaction_count,
            })
            .collect())
    }
}
