use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::entities::{bus, expense, user};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub category: String,
    pub bus_id: Uuid,
    pub bus_number: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn validate_expense(request: &ExpenseRequest) -> AppResult<()> {
    if request.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if request.category.trim().is_empty() {
        return Err(AppError::BadRequest("Category is required".to_string()));
    }
    Ok(())
}

fn to_response(
    expense: expense::Model,
    bus_number: String,
    created_by: String,
) -> ExpenseResponse {
    ExpenseResponse {
        id: expense.id,
        transaction_date: expense.transaction_date,
        amount: expense.amount,
        category: expense.category,
        bus_id: expense.bus_id,
        bus_number,
        created_by,
        created_at: expense.created_at.with_timezone(&Utc),
        updated_at: expense.updated_at.with_timezone(&Utc),
    }
}

/// Map a batch of expenses, resolving bus numbers and creator usernames
async fn map_expenses(
    state: &AppState,
    expenses: Vec<expense::Model>,
) -> AppResult<Vec<ExpenseResponse>> {
    let bus_ids: Vec<Uuid> = expenses.iter().map(|e| e.bus_id).collect();
    let user_ids: Vec<Uuid> = expenses.iter().map(|e| e.created_by).collect();

    let buses = bus::Entity::find()
        .filter(bus::Column::Id.is_in(bus_ids))
        .all(&state.db)
        .await?;
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&state.db)
        .await?;

    Ok(expenses
        .into_iter()
        .map(|e| {
            let bus_number = buses
                .iter()
                .find(|b| b.id == e.bus_id)
                .map(|b| b.bus_number.clone())
                .unwrap_or_default();
            let created_by = users
                .iter()
                .find(|u| u.id == e.created_by)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            to_response(e, bus_number, created_by)
        })
        .collect())
}

/// Record an expense for a bus
pub async fn add_expense(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Json(payload): Json<ExpenseRequest>,
) -> AppResult<Json<ExpenseResponse>> {
    let bus = access::ensure_bus_access(&state.db, &claims, bus_id).await?;
    validate_expense(&payload)?;

    let expense = expense::ActiveModel {
        id: Set(Uuid::new_v4()),
        transaction_date: Set(payload.transaction_date),
        amount: Set(payload.amount),
        category: Set(payload.category.clone()),
        bus_id: Set(bus.id),
        created_by: Set(claims.sub),
        ..Default::default()
    };

    let expense = expense.insert(&state.db).await?;

    tracing::info!(
        "User {} added expense {} for bus {}",
        claims.username,
        expense.id,
        bus.bus_number
    );

    Ok(Json(to_response(expense, bus.bus_number, claims.username)))
}

/// List expenses across every bus the caller can access
pub async fn list_my_expenses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ExpenseResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let expenses = expense::Entity::find()
        .filter(expense::Column::BusId.is_in(bus_ids))
        .all(&state.db)
        .await?;

    Ok(Json(map_expenses(&state, expenses).await?))
}

/// List expenses for one bus
pub async fn list_by_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
) -> AppResult<Json<Vec<ExpenseResponse>>> {
    access::ensure_bus_access(&state.db, &claims, bus_id).await?;

    let expenses = expense::Entity::find()
        .filter(expense::Column::BusId.eq(bus_id))
        .all(&state.db)
        .await?;

    Ok(Json(map_expenses(&state, expenses).await?))
}

/// Get a single expense entry
pub async fn get_expense(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<Uuid>,
) -> AppResult<Json<ExpenseResponse>> {
    let expense = expense::Entity::find_by_id(expense_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Expense not found with id: {}", expense_id)))?;

    let bus = access::ensure_bus_access(&state.db, &claims, expense.bus_id).await?;

    let created_by = user::Entity::find_by_id(expense.created_by)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(Json(to_response(expense, bus.bus_number, created_by)))
}

/// List expenses in a date range across accessible buses
pub async fn list_by_date_range(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(range): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<ExpenseResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let expenses = expense::Entity::find()
        .filter(expense::Column::BusId.is_in(bus_ids))
        .filter(expense::Column::TransactionDate.between(range.start_date, range.end_date))
        .all(&state.db)
        .await?;

    Ok(Json(map_expenses(&state, expenses).await?))
}

/// List expenses in a date range for one bus
pub async fn list_by_bus_and_date_range(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<ExpenseResponse>>> {
    access::ensure_bus_access(&state.db, &claims, bus_id).await?;

    let expenses = expense::Entity::find()
        .filter(expense::Column::BusId.eq(bus_id))
        .filter(expense::Column::TransactionDate.between(range.start_date, range.end_date))
        .all(&state.db)
        .await?;

    Ok(Json(map_expenses(&state, expenses).await?))
}

/// List expenses with a given category across accessible buses
pub async fn list_by_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<ExpenseResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let expenses = expense::Entity::find()
        .filter(expense::Column::BusId.is_in(bus_ids))
        .filter(expense::Column::Category.eq(category))
        .all(&state.db)
        .await?;

    Ok(Json(map_expenses(&state, expenses).await?))
}

/// Update an expense (owner, or the conductor who created it)
pub async fn update_expense(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<Uuid>,
    Json(payload): Json<ExpenseRequest>,
) -> AppResult<Json<ExpenseResponse>> {
    let expense = expense::Entity::find_by_id(expense_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Expense not found with id: {}", expense_id)))?;

    let bus = access::ensure_bus_access(&state.db, &claims, expense.bus_id).await?;
    access::ensure_record_editable(&claims, expense.created_by)?;
    validate_expense(&payload)?;

    let created_by = expense.created_by;
    let mut active: expense::ActiveModel = expense.into();
    active.transaction_date = Set(payload.transaction_date);
    active.amount = Set(payload.amount);
    active.category = Set(payload.category.clone());
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&state.db).await?;

    tracing::info!("User {} updated expense {}", claims.username, expense_id);

    let created_by = user::Entity::find_by_id(created_by)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(Json(to_response(updated, bus.bus_number, created_by)))
}

/// Delete an expense (owner, or the conductor who created it)
pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(expense_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let expense = expense::Entity::find_by_id(expense_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Expense not found with id: {}", expense_id)))?;

    access::ensure_bus_access(&state.db, &claims, expense.bus_id).await?;
    access::ensure_record_editable(&claims, expense.created_by)?;

    expense::Entity::delete_by_id(expense_id)
        .exec(&state.db)
        .await?;

    tracing::info!("User {} deleted expense {}", claims.username, expense_id);

    Ok(Json(serde_json::json!({ "message": "Expense deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64, category: &str) -> ExpenseRequest {
        ExpenseRequest {
            transaction_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            amount: Decimal::from(amount),
            category: category.to_string(),
        }
    }

    #[test]
    fn valid_expense_passes() {
        validate_expense(&request(500, "Fuel")).unwrap();
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        assert!(matches!(
            validate_expense(&request(0, "Fuel")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_expense(&request(-10, "Fuel")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn blank_category_is_rejected() {
        assert!(matches!(
            validate_expense(&request(500, "  ")),
            Err(AppError::BadRequest(_))
        ));
    }
}
