// src/domain/transaction_model.rs

use super::marketplace_status::{TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// 決済・返金・出金などの取引
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub payer_id: Uuid,
    pub payee_id: Option<Uuid>,
    pub amount: f64,
    pub transaction_type: String,
    pub status: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::domain::project_model::Entity",
        from = "Column::ProjectId",
        to = "crate::domain::project_model::Column::Id"
    )]
    Project,
}

impl Related<crate::domain::project_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            transaction_type: Set(TransactionType::Payment.as_str().to_string()),
            status: Set(TransactionStatus::Pending.as_str().to_string()),
            created_at: Set(Utc::now()),
            ..ActiveModelTrait::default()
        }
    }
}
