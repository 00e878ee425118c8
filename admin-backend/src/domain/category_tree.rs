// src/domain/category_tree.rs

use crate::domain::category_model::Column;
use crate::error::AppResult;
use crate::repository::metric_query::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// カテゴリ階層の1ノード。子は displayOrder の昇順
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub service_count: u64,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// categories の Select 結果から子を持たないノードを作る
    pub fn from_record(record: &Record, service_count: u64) -> AppResult<Self> {
        Ok(Self {
            id: record.uuid(Column::Id)?,
            name: record.text(Column::Name)?,
            slug: record.text(Column::Slug)?,
            icon: record.opt_text(Column::Icon)?,
            display_order: record.int(Column::DisplayOrder)? as i32,
            is_active: record.boolean(Column::IsActive)?,
            service_count,
            children: Vec::new(),
        })
    }

    /// 自身と子孫のノード数
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::node_count).sum::<usize>()
    }

    /// 自身を1とした深さ
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CategoryNode::depth)
            .max()
            .unwrap_or(0)
    }
}
