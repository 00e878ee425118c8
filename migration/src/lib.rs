// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// 会員・カテゴリ
mod m20251001_000001_create_users_table;
mod m20251001_000002_create_categories_table;

// 出品・案件
mod m20251001_000003_create_services_table;
mod m20251001_000004_create_projects_table;

// 決済・レビュー・操作ログ
mod m20251001_000005_create_transactions_table;
mod m20251001_000006_create_reviews_table;
mod m20251001_000007_create_activity_logs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 依存関係の順に作成する
            Box::new(m20251001_000001_create_users_table::Migration),
            Box::new(m20251001_000002_create_categories_table::Migration),
            Box::new(m20251001_000003_create_services_table::Migration),
            Box::new(m20251001_000004_create_projects_table::Migration),
            Box::new(m20251001_000005_create_transactions_table::Migration),
            Box::new(m20251001_000006_create_reviews_table::Migration),
            Box::new(m20251001_000007_create_activity_logs_table::Migration),
        ]
    }
}
