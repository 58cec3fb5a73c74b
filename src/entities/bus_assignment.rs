use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A grant of bus access for a conductor. Revoking deactivates the row and
/// stamps `revoked_date`; the row itself is kept as an audit trail.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bus_assignment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub bus_id: Uuid,
    pub assigned_by: Uuid,
    pub is_active: bool,
    pub assigned_date: DateTimeWithTimeZone,
    pub revoked_date: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    Conductor,
    #[sea_orm(
        belongs_to = "super::bus::Entity",
        from = "Column::BusId",
        to = "super::bus::Column::Id"
    )]
    Bus,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AssignedBy",
        to = "super::user::Column::Id"
    )]
    AssignedBy,
}

impl Related<super::bus::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bus.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
