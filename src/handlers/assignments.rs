use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::entities::user::{self, UserRole};
use crate::entities::{bus, bus_assignment};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignBusRequest {
    pub bus_id: Uuid,
    pub conductor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ActiveFilter {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub conductor_id: Uuid,
    pub conductor_username: String,
    pub bus_id: Uuid,
    pub bus_number: String,
    pub assigned_by_username: String,
    pub is_active: bool,
    pub assigned_date: DateTime<Utc>,
    pub revoked_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn to_response(
    assignment: bus_assignment::Model,
    conductor_username: String,
    bus_number: String,
    assigned_by_username: String,
) -> AssignmentResponse {
    AssignmentResponse {
        id: assignment.id,
        conductor_id: assignment.user_id,
        conductor_username,
        bus_id: assignment.bus_id,
        bus_number,
        assigned_by_username,
        is_active: assignment.is_active,
        assigned_date: assignment.assigned_date.with_timezone(&Utc),
        revoked_date: assignment.revoked_date.map(|d| d.with_timezone(&Utc)),
        created_at: assignment.created_at.with_timezone(&Utc),
    }
}

/// Map a batch of assignments, resolving conductor usernames and bus numbers
async fn map_assignments(
    state: &AppState,
    assignments: Vec<bus_assignment::Model>,
) -> AppResult<Vec<AssignmentResponse>> {
    let mut user_ids: Vec<Uuid> = assignments.iter().map(|a| a.user_id).collect();
    user_ids.extend(assignments.iter().map(|a| a.assigned_by));
    let bus_ids: Vec<Uuid> = assignments.iter().map(|a| a.bus_id).collect();

    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&state.db)
        .await?;
    let buses = bus::Entity::find()
        .filter(bus::Column::Id.is_in(bus_ids))
        .all(&state.db)
        .await?;

    let username = |id: Uuid| {
        users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    };

    Ok(assignments
        .into_iter()
        .map(|a| {
            let conductor_username = username(a.user_id);
            let assigned_by_username = username(a.assigned_by);
            let bus_number = buses
                .iter()
                .find(|b| b.id == a.bus_id)
                .map(|b| b.bus_number.clone())
                .unwrap_or_default();
            to_response(a, conductor_username, bus_number, assigned_by_username)
        })
        .collect())
}

/// Assign a conductor to a bus (owner only)
pub async fn assign_conductor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AssignBusRequest>,
) -> AppResult<Json<AssignmentResponse>> {
    let bus = access::ensure_bus_owned(&state.db, &claims, payload.bus_id).await?;

    // Target user must hold the conductor role
    let conductor = user::Entity::find_by_id(payload.conductor_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("User not found with id: {}", payload.conductor_id))
        })?;

    if conductor.role != UserRole::Conductor {
        return Err(AppError::BadRequest("User is not a conductor".to_string()));
    }

    // Reject a duplicate active grant; the partial unique index on
    // (user_id, bus_id) WHERE is_active backs this check under races.
    let already_assigned = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::UserId.eq(conductor.id))
        .filter(bus_assignment::Column::BusId.eq(bus.id))
        .filter(bus_assignment::Column::IsActive.eq(true))
        .one(&state.db)
        .await?;

    if already_assigned.is_some() {
        return Err(AppError::Conflict(format!(
            "Conductor is already assigned to bus: {}",
            bus.bus_number
        )));
    }

    let assignment = bus_assignment::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(conductor.id),
        bus_id: Set(bus.id),
        assigned_by: Set(claims.sub),
        is_active: Set(true),
        assigned_date: Set(Utc::now().fixed_offset()),
        revoked_date: Set(None),
        ..Default::default()
    };

    let assignment = assignment.insert(&state.db).await.map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Conductor is already assigned to bus: {}", bus.bus_number),
        )
    })?;

    tracing::info!(
        "Owner {} assigned conductor {} to bus {}",
        claims.username,
        conductor.username,
        bus.bus_number
    );

    Ok(Json(to_response(
        assignment,
        conductor.username,
        bus.bus_number,
        claims.username,
    )))
}

/// List all assignments across the caller's fleet (owner only)
pub async fn list_my_assignments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<AssignmentResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let assignments = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::BusId.is_in(bus_ids))
        .all(&state.db)
        .await?;

    Ok(Json(map_assignments(&state, assignments).await?))
}

/// List assignments for one bus (owner only)
pub async fn list_for_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Query(filter): Query<ActiveFilter>,
) -> AppResult<Json<Vec<AssignmentResponse>>> {
    access::ensure_bus_owned(&state.db, &claims, bus_id).await?;

    let mut query = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::BusId.eq(bus_id));
    if filter.active_only {
        query = query.filter(bus_assignment::Column::IsActive.eq(true));
    }
    let assignments = query.all(&state.db).await?;

    Ok(Json(map_assignments(&state, assignments).await?))
}

/// List a conductor's assignments, restricted to buses the caller owns so
/// one owner never sees another owner's grants (owner only)
pub async fn list_for_conductor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conductor_id): Path<Uuid>,
    Query(filter): Query<ActiveFilter>,
) -> AppResult<Json<Vec<AssignmentResponse>>> {
    let conductor = user::Entity::find_by_id(conductor_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Conductor not found with id: {}", conductor_id))
        })?;

    if conductor.role != UserRole::Conductor {
        return Err(AppError::BadRequest("User is not a conductor".to_string()));
    }

    let owned_bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let mut query = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::UserId.eq(conductor_id))
        .filter(bus_assignment::Column::BusId.is_in(owned_bus_ids));
    if filter.active_only {
        query = query.filter(bus_assignment::Column::IsActive.eq(true));
    }
    let assignments = query.all(&state.db).await?;

    Ok(Json(map_assignments(&state, assignments).await?))
}

/// Revoke an assignment (owner only). The row is kept as an audit trail;
/// a revoked grant never becomes active again.
pub async fn revoke_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let assignment = bus_assignment::Entity::find_by_id(assignment_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Assignment not found with id: {}", assignment_id))
        })?;

    access::ensure_bus_owned(&state.db, &claims, assignment.bus_id).await?;

    if !assignment.is_active {
        return Err(AppError::BadRequest(
            "Assignment is already inactive".to_string(),
        ));
    }

    let mut active: bus_assignment::ActiveModel = assignment.into();
    active.is_active = Set(false);
    active.revoked_date = Set(Some(Utc::now().fixed_offset()));
    active.update(&state.db).await?;

    tracing::info!(
        "Owner {} revoked assignment {}",
        claims.username,
        assignment_id
    );

    Ok(Json(serde_json::json!({ "message": "Assignment revoked" })))
}

/// Permanently delete an assignment row, active or not (owner only)
pub async fn delete_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let assignment = bus_assignment::Entity::find_by_id(assignment_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Assignment not found with id: {}", assignment_id))
        })?;

    access::ensure_bus_owned(&state.db, &claims, assignment.bus_id).await?;

    bus_assignment::Entity::delete_by_id(assignment_id)
        .exec(&state.db)
        .await?;

    tracing::info!(
        "Owner {} deleted assignment {}",
        claims.username,
        assignment_id
    );

    Ok(Json(serde_json::json!({ "message": "Assignment deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

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

    fn bus_model(id: Uuid, owner_id: Uuid) -> bus::Model {
        bus::Model {
            id,
            bus_number: "NB-1234".to_string(),
            owner_id,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    fn conductor_model(id: Uuid) -> user::Model {
        user::Model {
            id,
            username: "conductor".to_string(),
            password_hash: String::new(),
            role: UserRole::Conductor,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn assignment_model(
        user_id: Uuid,
        bus_id: Uuid,
        is_active: bool,
    ) -> bus_assignment::Model {
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
    async fn duplicate_active_assignment_is_a_conflict() {
        let owner_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let conductor_id = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_model(bus_id, owner_id)]])
            .append_query_results([vec![conductor_model(conductor_id)]])
            .append_query_results([vec![assignment_model(conductor_id, bus_id, true)]])
            .into_connection();

        let result = assign_conductor(
            State(test_state(db)),
            Extension(owner_claims(owner_id)),
            Json(AssignBusRequest {
                bus_id,
                conductor_id,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn assigning_an_owner_as_conductor_is_rejected() {
        let owner_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();

        let mut target = conductor_model(target_id);
        target.role = UserRole::Owner;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![bus_model(bus_id, owner_id)]])
            .append_query_results([vec![target]])
            .into_connection();

        let result = assign_conductor(
            State(test_state(db)),
            Extension(owner_claims(owner_id)),
            Json(AssignBusRequest {
                bus_id,
                conductor_id: target_id,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn revoking_an_inactive_assignment_fails() {
        let owner_id = Uuid::new_v4();
        let bus_id = Uuid::new_v4();
        let assignment = assignment_model(Uuid::new_v4(), bus_id, false);
        let assignment_id = assignment.id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![assignment]])
            .append_query_results([vec![bus_model(bus_id, owner_id)]])
            .into_connection();

        let result = revoke_assignment(
            State(test_state(db)),
            Extension(owner_claims(owner_id)),
            Path(assignment_id),
        )
        .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn revoking_a_foreign_assignment_is_masked() {
        let bus_id = Uuid::new_v4();
        let assignment = assignment_model(Uuid::new_v4(), bus_id, true);
        let assignment_id = assignment.id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![assignment]])
            .append_query_results([vec![bus_model(bus_id, Uuid::new_v4())]])
            .into_connection();

        let result = revoke_assignment(
            State(test_state(db)),
            Extension(owner_claims(Uuid::new_v4())),
            Path(assignment_id),
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
