use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::entities::bus_assignment;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::{hash_password, validate_password};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConductorRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ConductorResponse {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub assigned_buses_count: u64,
    pub created_at: DateTime<Utc>,
}

async fn to_response(
    state: &AppState,
    conductor: user::Model,
) -> AppResult<ConductorResponse> {
    let assigned_buses_count = bus_assignment::Entity::find()
        .filter(bus_assignment::Column::UserId.eq(conductor.id))
        .filter(bus_assignment::Column::IsActive.eq(true))
        .count(&state.db)
        .await?;

    Ok(ConductorResponse {
        id: conductor.id,
        username: conductor.username,
        role: conductor.role,
        assigned_buses_count,
        created_at: conductor.created_at.with_timezone(&Utc),
    })
}

/// Create a conductor account (owner only)
pub async fn create_conductor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateConductorRequest>,
) -> AppResult<Json<ConductorResponse>> {
    if payload.username.trim().is_empty() {
        return Err(AppError::BadRequest("Username is required".to_string()));
    }
    validate_password(&payload.password)?;

    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(&payload.username))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Username already exists: {}",
            payload.username
        )));
    }

    let password_hash = hash_password(&payload.password)?;

    let conductor = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(payload.username.clone()),
        password_hash: Set(password_hash),
        role: Set(UserRole::Conductor),
        ..Default::default()
    };

    let conductor = conductor.insert(&state.db).await.map_err(|e| {
        AppError::unique_violation(
            e,
            format!("Username already exists: {}", payload.username),
        )
    })?;

    tracing::info!(
        "Owner {} created conductor {}",
        claims.username,
        conductor.username
    );

    Ok(Json(ConductorResponse {
        id: conductor.id,
        username: conductor.username,
        role: conductor.role,
        assigned_buses_count: 0,
        created_at: conductor.created_at.with_timezone(&Utc),
    }))
}

/// List all conductor accounts (owner only)
pub async fn list_conductors(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ConductorResponse>>> {
    let conductors = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Conductor))
        .all(&state.db)
        .await?;

    let mut responses = Vec::new();
    for conductor in conductors {
        responses.push(to_response(&state, conductor).await?);
    }

    Ok(Json(responses))
}

/// Get a conductor by id (owner only)
pub async fn get_conductor(
    State(state): State<AppState>,
    Path(conductor_id): Path<Uuid>,
) -> AppResult<Json<ConductorResponse>> {
    let conductor = user::Entity::find_by_id(conductor_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Conductor not found with id: {}", conductor_id)))?;

    if conductor.role != UserRole::Conductor {
        return Err(AppError::BadRequest("User is not a conductor".to_string()));
    }

    Ok(Json(to_response(&state, conductor).await?))
}
