// src/service/category_hierarchy_service.rs

use crate::domain::analytics_model::{percentage, CategoryPerformance};
use crate::domain::category_tree::CategoryNode;
use crate::domain::marketplace_status::ProjectStatus;
use crate::domain::{category_model, project_model, service_model, transaction_model};
use crate::error::{AppError, AppResult};
use crate::repository::metric_query::{FieldType, MetricQuery, Record, SortDirection};
use crate::service::dashboard_service::completed_revenue_query;
use crate::service::fan_out_runner::{FanOutRunner, QueryBatch};
use std::collections::HashMap;
use uuid::Uuid;

/// categories の1階層分を displayOrder → name の順で取るクエリ
fn level_query() -> MetricQuery {
    use category_model::Column;

    MetricQuery::select(category_model::Entity)
        .column(Column::Id, FieldType::Uuid)
        .column(Column::Name, FieldType::Text)
        .column(Column::Slug, FieldType::Text)
        .column(Column::Icon, FieldType::Text)
        .column(Column::ParentId, FieldType::Uuid)
        .column(Column::DisplayOrder, FieldType::Int)
        .column(Column::IsActive, FieldType::Bool)
        .order_by(Column::DisplayOrder, SortDirection::Asc)
        .order_by(Column::Name, SortDirection::Asc)
}

/// 最大3階層のカテゴリツリーを組み立てる
#[derive(Clone)]
pub struct CategoryHierarchyBuilder {
    runner: FanOutRunner,
}

impl CategoryHierarchyBuilder {
    pub fn new(runner: FanOutRunner) -> Self {
        Self { runner }
    }

    /// ルート、子、孫の順に1階層ずつ取得し、各ノードのサービス数を付けて組み立てる
    pub async fn build_tree(&self) -> AppResult<Vec<CategoryNode>> {
        let roots = self
            .fetch_level("roots", level_query().is_null(category_model::Column::ParentId))
            .await?;
        let children = self.fetch_children("children", &roots).await?;
        let grandchildren = self.fetch_children("grandchildren", &children).await?;

        let mut grandchildren_by_parent = Self::group_by_parent(grandchildren);
        let mut children_by_parent: HashMap<Uuid, Vec<CategoryNode>> = HashMap::new();
        for (parent, mut child) in children {
            child.children = grandchildren_by_parent.remove(&child.id).unwrap_or_default();
            if let Some(parent) = parent {
                children_by_parent.entry(parent).or_default().push(child);
            }
        }

        Ok(roots
            .into_iter()
            .map(|(_, mut root)| {
                root.children = children_by_parent.remove(&root.id).unwrap_or_default();
                root
            })
            .collect())
    }

    async fn fetch_children(
        &self,
        level: &str,
        parents: &[(Option<Uuid>, CategoryNode)],
    ) -> AppResult<Vec<(Option<Uuid>, CategoryNode)>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let parent_ids: Vec<Uuid> = parents.iter().map(|(_, node)| node.id).collect();
        self.fetch_level(
            level,
            level_query().is_in(category_model::Column::ParentId, parent_ids),
        )
        .await
    }

    /// 1階層分を取得し、同じ順序でサービス数を付けたノードを返す（親IDつき）
    async fn fetch_level(
        &self,
        level: &str,
        query: MetricQuery,
    ) -> AppResult<Vec<(Option<Uuid>, CategoryNode)>> {
        let fetched = self
            .runner
            .run(QueryBatch::new(format!("category_hierarchy.{}", level)).add("level", query))
            .await?;
        let records: &[Record] = fetched.records("level")?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut counts = QueryBatch::new(format!("category_hierarchy.{}.service_counts", level));
        for record in records {
            let id = record.uuid(category_model::Column::Id)?;
            counts.push(
                id.to_string(),
                MetricQuery::count(service_model::Entity)
                    .eq(service_model::Column::CategoryId, id),
            );
        }
        let counts = self.runner.run(counts).await?;

        records
            .iter()
            .map(|record| {
                let id = record.uuid(category_model::Column::Id)?;
                let node = CategoryNode::from_record(record, counts.count(&id.to_string())?)?;
                Ok((record.opt_uuid(category_model::Column::ParentId)?, node))
            })
            .collect()
    }

    // 取得順（displayOrder → name）を保ったまま親ごとにまとめる
    fn group_by_parent(
        nodes: Vec<(Option<Uuid>, CategoryNode)>,
    ) -> HashMap<Uuid, Vec<CategoryNode>> {
        let mut grouped: HashMap<Uuid, Vec<CategoryNode>> = HashMap::new();
        for (parent, node) in nodes {
            if let Some(parent) = parent {
                grouped.entry(parent).or_default().push(node);
            }
        }
        grouped
    }

    /// 1カテゴリのサービス数・案件数・完了率・売上
    pub async fn category_performance(&self, category_id: Uuid) -> AppResult<CategoryPerformance> {
        let lookup = QueryBatch::new("category_performance.lookup")
            .add(
                "category",
                MetricQuery::select(category_model::Entity)
                    .column(category_model::Column::Id, FieldType::Uuid)
                    .column(category_model::Column::Name, FieldType::Text)
                    .eq(category_model::Column::Id, category_id)
                    .limit(1),
            )
            .add(
                "projects",
                MetricQuery::select(project_model::Entity)
                    .column(project_model::Column::Id, FieldType::Uuid)
                    .eq(project_model::Column::CategoryId, category_id),
            );
        let found = self.runner.run(lookup).await?;

        let category = found
            .records("category")?
            .first()
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", category_id)))?;
        let name = category.text(category_model::Column::Name)?;
        let project_ids = found
            .records("projects")?
            .iter()
            .map(|r| r.uuid(project_model::Column::Id))
            .collect::<AppResult<Vec<_>>>()?;

        let mut batch = QueryBatch::new("category_performance")
            .add(
                "services",
                MetricQuery::count(service_model::Entity)
                    .eq(service_model::Column::CategoryId, category_id),
            )
            .add(
                "completed",
                MetricQuery::count(project_model::Entity)
                    .eq(project_model::Column::CategoryId, category_id)
                    .eq(project_model::Column::Status, ProjectStatus::Completed.as_str()),
            );
        if !project_ids.is_empty() {
            batch.push(
                "revenue",
                completed_revenue_query(None)
                    .is_in(transaction_model::Column::ProjectId, project_ids.clone()),
            );
        }
        let bag = self.runner.run(batch).await?;

        let project_count = project_ids.len() as u64;
        let completed_projects = bag.count("completed")?;
        let revenue = if bag.contains("revenue") {
            bag.number("revenue")?
        } else {
            0.0
        };

        Ok(CategoryPerformance {
            id: category_id,
            name,
            service_count: bag.count("services")?,
            project_count,
            completed_projects,
            completion_rate: percentage(completed_projects as f64, project_count as f64),
            revenue,
        })
    }
}
