//! Access control guard.
//!
//! Every bus-scoped read or write resolves access here and nowhere else:
//! owners reach buses they own, conductors reach buses they hold an active
//! assignment for. Denials for bus-scoped checks are returned as `NotFound`
//! so a caller cannot probe which bus ids exist.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::entities::{bus, bus_assignment};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;

/// Resolve a bus the caller owns. Fails with `Forbidden` for non-owners and
/// `NotFound` when the bus is absent or owned by someone else.
pub async fn ensure_bus_owned(
    db: &impl ConnectionTrait,
    claims: &Claims,
    bus_id: Uuid,
) -> AppResult<bus::Model> {
    if claims.role != UserRole::Owner {
        return Err(AppError::Forbidden("Owner role required".to_string()));
    }

    let bus = bus::Entity::find_by_id(bus_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))?;

    // Masked as NotFound: another owner's bus must look absent.
    if bus.owner_id != claims.sub {
        return Err(AppError::NotFound("Bus not found".to_string()));
    }

    Ok(bus)
}

/// Resolve a bus the caller may read or write transactions for: owners via
/// ownership, conductors via an active assignment.
pub async fn ensure_bus_access(
    db: &impl ConnectionTrait,
    claims: &Claims,
    bus_id: Uuid,
) -> AppResult<bus::Model> {
    match claims.role {
        UserRole::Owner => ensure_bus_owned(db, claims, bus_id).await,
        UserRole::Conductor => {
            let assigned = bus_assignment::Entity::find()
                .filter(bus_assignment::Column::UserId.eq(claims.sub))
                .filter(bus_assignment::Column::BusId.eq(bus_id))
                .filter(bus_assignment::Column::IsActive.eq(true))
                .one(db)
                .await?;

            if assigned.is_none() {
                return Err(AppError::NotFound("Bus not found".to_string()));
            }

            bus::Entity::find_by_id(bus_id)
                .one(db)
                .await?
                .ok_or_else(|| AppError::NotFound("Bus not found".to_string()))
        }
    }
}

/// Owners may edit any record on their buses; conductors only records they
/// created themselves. Bus access must already have been established.
pub fn ensure_record_editable(claims: &Claims, created_by: Uuid) -> AppResult<()> {
    if claims.role != UserRole::Owner && created_by != claims.sub {
        return Err(AppError::Forbidden(
            "Only the owner or the creator can modify this record".to_string(),
        ));
    }
    Ok(())
}

/// All bus ids the caller may touch: owned buses for owners, actively
/// assigned buses for conductors.
pub async fn accessible_bus_ids(
    db: &impl ConnectionTrait,
    claims: &Claims,
) -> AppResult<Vec<Uuid>> {
    match claims.role {
        UserRole::Owner => {
            let buses = bus::Entity::find()
                .filter(bus::Column::OwnerId.eq(claims.sub))
                .all(db)
                .await?;
            Ok(buses.into_iter().map(|b| b.id).collect())
        }
        UserRole::Conductor => {
            let assignments = bus_assignment::Entity::find()
                .filter(bus_assignment::Column::UserId.eq(claims.sub))
                .filter(bus_assignment::Column::IsActive.eq(true))
                .all(db)
                .await?;
            Ok(assignments.into_iter().map(|a| a.bus_id).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn claims(user_id: Uuid, role: UserRole) -> Claims {
        Claims {
            sub: user_id,
            username: "test".to_string(),
            role,
            exp: 0,
            iat: 0,
        }
    }

    fn bus_model(id: Uuid, owner_id: Uuid) -> bus::Model {
        bus::Model {
            id,
            bus_number: "NB-1234".to_string(),
            owner_id,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    fn assignment_model(user_id: Uuid, bus_id: Uuid, is_active: bool) -> bus_assignment::Model {
        bus_assignment::Model {
            id: Uuid::new_v4(),
            user_id,
            bus_id,
            assigned_by: Uuid::new_v4(),
            is_active,
            assigned_date: Utc::now().fixed_offset(),
            revoked_date: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn owner_can_access_owned_bus() {
        let owner_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_model(bus_id, owner_id)]])
            .into_connection();

        let bus = ensure_bus_access(&db, &claims(owner_id, UserRole::Owner), bus_id)
            .await
            .unwrap();
        assert_eq!(bus.id, bus_id);
    }

    #[tokio::test]
    async fn foreign_bus_is_masked_as_not_found() {
        let bus_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_model(bus_id, Uuid::new_v4())]])
            .into_connection();

        let result =
            ensure_bus_access(&db, &claims(Uuid::new_v4(), UserRole::Owner), bus_id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_bus_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<bus::Model>::new()])
            .into_connection();

        let result = ensure_bus_access(
            &db,
            &claims(Uuid::new_v4(), UserRole::Owner),
            Uuid::new_v4(),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn conductor_with_active_assignment_can_access() {
        let conductor_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![assignment_model(conductor_id, bus_id, true)]])
            .append_query_results([vec![bus_model(bus_id, Uuid::new_v4())]])
            .into_connection();

        let bus = ensure_bus_access(&db, &claims(conductor_id, UserRole::Conductor), bus_id)
            .await
            .unwrap();
        assert_eq!(bus.id, bus_id);
    }

    #[tokio::test]
    async fn conductor_without_assignment_is_denied() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<bus_assignment::Model>::new()])
            .into_connection();

        let result = ensure_bus_access(
            &db,
            &claims(Uuid::new_v4(), UserRole::Conductor),
            Uuid::new_v4(),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn conductor_cannot_use_owner_guard() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = ensure_bus_owned(
            &db,
            &claims(Uuid::new_v4(), UserRole::Conductor),
            Uuid::new_v4(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn accessible_ids_follow_active_assignments() {
        let conductor_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![assignment_model(conductor_id, bus_id, true)]])
            .into_connection();

        let ids = accessible_bus_ids(&db, &claims(conductor_id, UserRole::Conductor))
            .await
            .unwrap();
        assert_eq!(ids, vec![bus_id]);
    }
}
