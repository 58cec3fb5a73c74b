use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bus::Table)
                    .if_not_exists()
                    .col(uuid(Bus::Id).primary_key())
                    .col(string_len(Bus::BusNumber, 50).not_null().unique_key())
                    .col(uuid(Bus::OwnerId).not_null())
                    .col(
                        timestamp_with_time_zone(Bus::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Bus::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bus_owner")
                            .from(Bus::Table, Bus::OwnerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bus::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Bus {
    Table,
    Id,
    BusNumber,
    OwnerId,
    CreatedAt,
    UpdatedAt,
}
