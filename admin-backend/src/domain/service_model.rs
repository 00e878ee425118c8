// src/domain/service_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// フリーランサーが出品するサービス
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub price: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::domain::user_model::Entity",
        from = "Column::FreelancerId",
        to = "crate::domain::user_model::Column::Id"
    )]
    Freelancer,

    #[sea_orm(
        belongs_to = "crate::domain::category_model::Entity",
        from = "Column::CategoryId",
        to = "crate::domain::category_model::Column::Id"
    )]
    Category,
}

impl Related<crate::domain::user_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Freelancer.def()
    }
}

impl Related<crate::domain::category_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
