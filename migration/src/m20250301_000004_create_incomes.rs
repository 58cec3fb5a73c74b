use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_buses::Bus;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create income type enum
        manager
            .create_type(
                Type::create()
                    .as_enum(IncomeType::Enum)
                    .values([IncomeType::Trip, IncomeType::Hire])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Income::Table)
                    .if_not_exists()
                    .col(uuid(Income::Id).primary_key())
                    .col(date(Income::TransactionDate).not_null())
                    .col(decimal_len(Income::Amount, 12, 2).not_null())
                    .col(
                        ColumnDef::new(Income::IncomeType)
                            .custom(IncomeType::Enum)
                            .not_null(),
                    )
                    .col(uuid(Income::BusId).not_null())
                    .col(uuid(Income::CreatedBy).not_null())
                    // Trip sub-record, populated only when income_type = trip
                    .col(ColumnDef::new(Income::TripNumberOfTrips).integer())
                    .col(ColumnDef::new(Income::TripOnwardAmount).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::TripReturnAmount).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::TripOtherExpense).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::TripDriverSalary).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::TripConductorSalary).decimal_len(12, 2))
                    // Hire sub-record, populated only when income_type = hire
                    .col(ColumnDef::new(Income::HireNumberOfDays).integer())
                    .col(ColumnDef::new(Income::HireOrigin).string_len(255))
                    .col(ColumnDef::new(Income::HireDestination).string_len(255))
                    .col(ColumnDef::new(Income::HireAmount).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::HireOtherExpense).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::HireDriverSalary).decimal_len(12, 2))
                    .col(ColumnDef::new(Income::HireConductorSalary).decimal_len(12, 2))
                    .col(
                        timestamp_with_time_zone(Income::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Income::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_income_bus")
                            .from(Income::Table, Income::BusId)
                            .to(Bus::Table, Bus::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_income_created_by")
                            .from(Income::Table, Income::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_income_bus_date")
                    .table(Income::Table)
                    .col(Income::BusId)
                    .col(Income::TransactionDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Income::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(IncomeType::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Income {
    Table,
    Id,
    TransactionDate,
    Amount,
    IncomeType,
    BusId,
    CreatedBy,
    TripNumberOfTrips,
    TripOnwardAmount,
    TripReturnAmount,
    TripOtherExpense,
    TripDriverSalary,
    TripConductorSalary,
    HireNumberOfDays,
    HireOrigin,
    HireDestination,
    HireAmount,
    HireOtherExpense,
    HireDriverSalary,
    HireConductorSalary,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum IncomeType {
    #[sea_orm(iden = "income_type")]
    Enum,
    #[sea_orm(iden = "trip")]
    Trip,
    #[sea_orm(iden = "hire")]
    Hire,
}
