use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::ProjectId).uuid().null())
                    .col(ColumnDef::new(Transactions::PayerId).uuid().not_null())
                    .col(ColumnDef::new(Transactions::PayeeId).uuid().null())
                    .col(ColumnDef::new(Transactions::Amount).double().not_null())
                    // PAYMENT / REFUND / PAYOUT / FEE
                    .col(
                        ColumnDef::new(Transactions::TransactionType)
                            .string_len(20)
                            .not_null(),
                    )
                    // PENDING / COMPLETED / FAILED
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string_len(20)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Transactions::PaymentMethod)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_project_id")
                            .from(Transactions::Table, Transactions::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_payer_id")
                            .from(Transactions::Table, Transactions::PayerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_payee_id")
                            .from(Transactions::Table, Transactions::PayeeId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // 売上集計（種別・状態・日時）用
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(Transactions::Table)
                    .name("idx_transactions_type_status_created_at")
                    .col(Transactions::TransactionType)
                    .col(Transactions::Status)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    ProjectId,
    PayerId,
    PayeeId,
    Amount,
    TransactionType,
    Status,
    PaymentMethod,
    CreatedAt,
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
