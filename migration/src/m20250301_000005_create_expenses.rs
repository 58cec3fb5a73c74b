use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_buses::Bus;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expense::Table)
                    .if_not_exists()
                    .col(uuid(Expense::Id).primary_key())
                    .col(date(Expense::TransactionDate).not_null())
                    .col(decimal_len(Expense::Amount, 12, 2).not_null())
                    .col(string_len(Expense::Category, 100).not_null())
                    .col(uuid(Expense::BusId).not_null())
                    .col(uuid(Expense::CreatedBy).not_null())
                    .col(
                        timestamp_with_time_zone(Expense::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Expense::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expense_bus")
                            .from(Expense::Table, Expense::BusId)
                            .to(Bus::Table, Bus::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expense_created_by")
                            .from(Expense::Table, Expense::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expense_bus_date")
                    .table(Expense::Table)
                    .col(Expense::BusId)
                    .col(Expense::TransactionDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Expense::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Expense {
    Table,
    Id,
    TransactionDate,
    Amount,
    Category,
    BusId,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
