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
                    .table(BusAssignment::Table)
                    .if_not_exists()
                    .col(uuid(BusAssignment::Id).primary_key())
                    .col(uuid(BusAssignment::UserId).not_null())
                    // Deliberately no FK to bus: assignment rows are the audit
                    // trail and must survive bus deletion.
                    .col(uuid(BusAssignment::BusId).not_null())
                    .col(uuid(BusAssignment::AssignedBy).not_null())
                    .col(boolean(BusAssignment::IsActive).not_null().default(true))
                    .col(timestamp_with_time_zone(BusAssignment::AssignedDate).not_null())
                    .col(ColumnDef::new(BusAssignment::RevokedDate).timestamp_with_time_zone())
                    .col(
                        timestamp_with_time_zone(BusAssignment::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bus_assignment_user")
                            .from(BusAssignment::Table, BusAssignment::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bus_assignment_assigned_by")
                            .from(BusAssignment::Table, BusAssignment::AssignedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One active assignment per (conductor, bus) pair, enforced by the
        // database so concurrent duplicate assigns cannot both commit.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_bus_assignment_active_pair \
                 ON bus_assignment (user_id, bus_id) WHERE is_active",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BusAssignment::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum BusAssignment {
    Table,
    Id,
    UserId,
    BusId,
    AssignedBy,
    IsActive,
    AssignedDate,
    RevokedDate,
    CreatedAt,
}
