use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "income_type")]
#[serde(rename_all = "UPPERCASE")]
pub enum IncomeType {
    #[sea_orm(string_value = "trip")]
    Trip,
    #[sea_orm(string_value = "hire")]
    Hire,
}

/// An income record for a bus. Exactly one of the `trip_*` / `hire_*` column
/// groups is populated, matching `income_type`. `amount` is the computed net
/// (revenue minus salaries and other expense), never supplied by the caller.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "income")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_date: Date,
    pub amount: Decimal,
    pub income_type: IncomeType,
    pub bus_id: Uuid,
    pub created_by: Uuid,
    pub trip_number_of_trips: Option<i32>,
    pub trip_onward_amount: Option<Decimal>,
    pub trip_return_amount: Option<Decimal>,
    pub trip_other_expense: Option<Decimal>,
    pub trip_driver_salary: Option<Decimal>,
    pub trip_conductor_salary: Option<Decimal>,
    pub hire_number_of_days: Option<i32>,
    pub hire_origin: Option<String>,
    pub hire_destination: Option<String>,
    pub hire_amount: Option<Decimal>,
    pub hire_other_expense: Option<Decimal>,
    pub hire_driver_salary: Option<Decimal>,
    pub hire_conductor_salary: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bus::Entity",
        from = "Column::BusId",
        to = "super::bus::Column::Id"
    )]
    Bus,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id"
    )]
    CreatedBy,
}

impl Related<super::bus::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bus.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
