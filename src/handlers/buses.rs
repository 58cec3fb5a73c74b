use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::entities::user::UserRole;
use crate::entities::{bus, bus_assignment, user};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BusRequest {
    pub bus_number: String,
}

#[derive(Debug, Serialize)]
pub struct BusResponse {
    pub id: Uuid,
    pub bus_number: String,
    pub owner_username: String,
    pub active_conductors_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

async fn to_response(
    db: &impl ConnectionTrait,
    bus: bus::Model,
    owner_username: String,
) -> AppResult<BusResponse> {
    // Derived at read time, never stored
    let active_conductors_count = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::BusId.eq(bus.id))
        .filter(bus_assignment::Column::IsActive.eq(true))
        .count(db)
        .await?;

    Ok(BusResponse {
        id: bus.id,
        bus_number: bus.bus_number,
        owner_username,
        active_conductors_count,
        created_at: bus.created_at.with_timezone(&Utc),
        updated_at: bus.updated_at.with_timezone(&Utc),
    })
}

/// Register a new bus (owner only)
pub async fn create_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BusRequest>,
) -> AppResult<Json<BusResponse>> {
    if claims.role != UserRole::Owner {
        return Err(AppError::Forbidden(
            "Only owners can create buses".to_string(),
        ));
    }

    if payload.bus_number.trim().is_empty() {
        return Err(AppError::BadRequest("Bus number is required".to_string()));
    }

    // Check if bus number already exists
    let existing = bus::Entity::find()
        .filter(bus::Column::BusNumber.eq(&payload.bus_number))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Bus number already exists: {}",
            payload.bus_number
        )));
    }

    let new_bus = bus::ActiveModel {
        id: Set(Uuid::new_v4()),
        bus_number: Set(payload.bus_number.clone()),
        owner_id: Set(claims.sub),
        ..Default::default()
    };

    let bus = new_bus.insert(&state.db).await.map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Bus number already exists: {}", payload.bus_number),
        )
    })?;

    tracing::info!("Owner {} created bus {}", claims.username, bus.bus_number);

    Ok(Json(to_response(&state.db, bus, claims.username).await?))
}

/// List buses accessible to the caller: owners see their fleet, conductors
/// see the buses they are actively assigned to.
pub async fn list_buses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<BusResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let buses = bus::Entity::find()
        .filter(bus::Column::Id.is_in(bus_ids))
        .all(&state.db)
        .await?;

    let owner_ids: Vec<Uuid> = buses.iter().map(|b| b.owner_id).collect();
    let owners = user::Entity::find()
        .filter(user::Column::Id.is_in(owner_ids))
        .all(&state.db)
        .await?;

    let mut responses = Vec::new();
    for bus in buses {
        let owner_username = owners
            .iter()
            .find(|o| o.id == bus.owner_id)
            .map(|o| o.username.clone())
            .unwrap_or_default();
        responses.push(to_response(&state.db, bus, owner_username).await?);
    }

    Ok(Json(responses))
}

/// Update a bus number (owner only)
pub async fn update_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Json(payload): Json<BusRequest>,
) -> AppResult<Json<BusResponse>> {
    let bus = access::ensure_bus_owned(&state.db, &claims, bus_id).await?;

    if payload.bus_number.trim().is_empty() {
        return Err(AppError::BadRequest("Bus number is required".to_string()));
    }

    // Check the new number is not taken by a different bus
    if bus.bus_number != payload.bus_number {
        let taken = bus::Entity::find()
            .filter(bus::Column::BusNumber.eq(&payload.bus_number))
            .one(&state.db)
            .await?;
        if taken.is_some() {
            return Err(AppError::Conflict(format!(
                "Bus number already exists: {}",
                payload.bus_number
            )));
        }
    }

    let mut active: bus::ActiveModel = bus.into();
    active.bus_number = Set(payload.bus_number.clone());
    active.updated_at = Set(Utc::now().fixed_offset());
    let updated = active.update(&state.db).await.map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Bus number already exists: {}", payload.bus_number),
        )
    })?;

    tracing::info!(
        "Owner {} updated bus {} to {}",
        claims.username,
        bus_id,
        updated.bus_number
    );

    Ok(Json(to_response(&state.db, updated, claims.username).await?))
}

/// Delete a bus (owner only). All active assignments for the bus are revoked
/// in the same transaction, so the conductors lose access atomically. The
/// revoked rows are kept as the audit trail; only the bus row is removed.
pub async fn delete_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let txn = state.db.begin().await?;

    let bus = access::ensure_bus_owned(&txn, &claims, bus_id).await?;

    let active_assignments = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::BusId.eq(bus_id))
        .filter(bus_assignment::Column::IsActive.eq(true))
        .all(&txn)
        .await?;

    let now = Utc::now().fixed_offset();
    for assignment in active_assignments {
        let mut active: bus_assignment::ActiveModel = assignment.into();
        active.is_active = Set(false);
        active.revoked_date = Set(Some(now));
        active.update(&txn).await?;
    }

    bus::Entity::delete_by_id(bus_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!("Owner {} deleted bus {}", claims.username, bus.bus_number);

    Ok(Json(serde_json::json!({ "message": "Bus deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::collections::BTreeMap;

    fn test_state(db: DatabaseConnection) -> AppState {
        AppState {
            db,
            config: Config {
                database_url: String::new(),
                jwt_secret: "test-secret".to_string(),
                jwt_expiration_hours: 1,
                server_host: "127.0.0.1".to_string(),
                server_port: 0,
            },
        }
    }

    fn owner_claims(owner_id: Uuid) -> Claims {
        Claims {
            sub: owner_id,
            username: "owner".to_string(),
            role: UserRole::Owner,
            exp: 0,
            iat: 0,
        }
    }

    fn bus_model(id: Uuid, owner_id: Uuid, bus_number: &str) -> bus::Model {
        bus::Model {
            id,
            bus_number: bus_number.to_string(),
            owner_id,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    fn owner_model(id: Uuid) -> user::Model {
        user::Model {
            id,
            username: "owner".to_string(),
            password_hash: String::new(),
            role: UserRole::Owner,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn assignment_model(bus_id: Uuid, is_active: bool) -> bus_assignment::Model {
        bus_assignment::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            bus_id,
            assigned_by: Uuid::new_v4(),
            is_active,
            assigned_date: Utc::now().fixed_offset(),
            revoked_date: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([("num_items", sea_orm::Value::BigInt(Some(n)))])
    }

    #[tokio::test]
    async fn deleting_a_bus_revokes_assignments_without_deleting_them() {
        let owner_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let assignment = assignment_model(bus_id, true);
        let mut revoked = assignment.clone();
        revoked.is_active = false;
        revoked.revoked_date = Some(Utc::now().fixed_offset());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_model(bus_id, owner_id, "NB-1234")]])
            .append_query_results([vec![assignment]])
            .append_query_results([vec![revoked]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        delete_bus(
            State(test_state(db.clone())),
            Extension(owner_claims(owner_id)),
            Path(bus_id),
        )
        .await
        .unwrap();

        // The assignment row must be updated to inactive, never deleted;
        // the revoke has to land before the bus row is removed.
        let log = format!("{:?}", db.into_transaction_log());
        let revoke_pos = log
            .find(r#"UPDATE \"bus_assignment\""#)
            .expect("assignment revoke missing");
        let delete_pos = log
            .find(r#"DELETE FROM \"bus\""#)
            .expect("bus delete missing");
        assert!(revoke_pos < delete_pos);
        assert!(!log.contains(r#"DELETE FROM \"bus_assignment\""#));
    }

    #[tokio::test]
    async fn former_conductor_loses_access_after_bus_deletion() {
        let conductor_id = Uuid::new_v4();

        // Once every assignment is revoked, the active-only lookup comes
        // back empty and the bus disappears from the conductor's view.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<bus_assignment::Model>::new()])
            .into_connection();

        let claims = Claims {
            sub: conductor_id,
            username: "conductor".to_string(),
            role: UserRole::Conductor,
            exp: 0,
            iat: 0,
        };

        let ids = access::accessible_bus_ids(&db, &claims).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn list_buses_reports_active_conductor_counts() {
        let owner_id = Uuid::new_v4();
        let bus_with_conductor = bus_model(Uuid::new_v4(), owner_id, "NB-1111");
        let bus_without = bus_model(Uuid::new_v4(), owner_id, "NB-2222");

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_with_conductor.clone(), bus_without.clone()]])
            .append_query_results([vec![bus_with_conductor, bus_without]])
            .append_query_results([vec![owner_model(owner_id)]])
            .append_query_results([vec![count_row(1)]])
            .append_query_results([vec![count_row(0)]])
            .into_connection();

        let buses = list_buses(State(test_state(db)), Extension(owner_claims(owner_id)))
            .await
            .unwrap()
            .0;

        assert_eq!(buses.len(), 2);
        assert_eq!(buses[0].bus_number, "NB-1111");
        assert_eq!(buses[0].active_conductors_count, 1);
        assert_eq!(buses[1].bus_number, "NB-2222");
        assert_eq!(buses[1].active_conductors_count, 0);
    }
}
