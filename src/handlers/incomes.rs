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
use crate::entities::income::{self, IncomeType};
use crate::entities::{bus, user};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::utils::money;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IncomeRequest {
    #[serde(rename = "type")]
    pub income_type: IncomeType,
    pub date: NaiveDate,
    pub trip: Option<TripIncome>,
    pub hire: Option<HireIncome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripIncome {
    pub number_of_trips: i32,
    pub onward_amount: Decimal,
    pub return_amount: Decimal,
    pub other_expense: Option<Decimal>,
    pub driver_salary: Decimal,
    pub conductor_salary: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HireIncome {
    pub number_of_days: i32,
    pub origin: String,
    pub destination: String,
    pub hire_amount: Decimal,
    pub other_expense: Option<Decimal>,
    pub driver_salary: Decimal,
    pub conductor_salary: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TripInfo {
    pub number_of_trips: i32,
    pub onward_amount: Decimal,
    pub return_amount: Decimal,
    pub other_expense: Decimal,
    pub driver_salary: Decimal,
    pub conductor_salary: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HireInfo {
    pub number_of_days: i32,
    pub origin: String,
    pub destination: String,
    pub hire_amount: Decimal,
    pub other_expense: Decimal,
    pub driver_salary: Decimal,
    pub conductor_salary: Decimal,
}

#[derive(Debug, Serialize)]
pub struct IncomeResponse {
    pub id: Uuid,
    pub income_type: IncomeType,
    pub profit_amount: Decimal,
    pub transaction_date: NaiveDate,
    pub bus_id: Uuid,
    pub bus_number: String,
    pub created_by: String,
    pub trip: Option<TripInfo>,
    pub hire: Option<HireInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn validate_trip(trip: &TripIncome) -> AppResult<()> {
    if !(1..=3).contains(&trip.number_of_trips) {
        return Err(AppError::BadRequest(
            "Number of trips must be between 1 and 3".to_string(),
        ));
    }
    if trip.onward_amount <= Decimal::ZERO || trip.return_amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Trip amounts must be greater than zero".to_string(),
        ));
    }
    if trip.driver_salary <= Decimal::ZERO || trip.conductor_salary <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Salaries must be greater than zero".to_string(),
        ));
    }
    if trip.other_expense.is_some_and(|e| e < Decimal::ZERO) {
        return Err(AppError::BadRequest(
            "Other expenses cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_hire(hire: &HireIncome) -> AppResult<()> {
    if !(1..=30).contains(&hire.number_of_days) {
        return Err(AppError::BadRequest(
            "Number of hire days must be between 1 and 30".to_string(),
        ));
    }
    if hire.origin.trim().is_empty() || hire.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Hire origin and destination are required".to_string(),
        ));
    }
    if hire.hire_amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Hire amount must be greater than zero".to_string(),
        ));
    }
    if hire.driver_salary <= Decimal::ZERO || hire.conductor_salary <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Salaries must be greater than zero".to_string(),
        ));
    }
    if hire.other_expense.is_some_and(|e| e < Decimal::ZERO) {
        return Err(AppError::BadRequest(
            "Other expenses cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Validate the type-specific sub-payload and write the date, type, computed
/// amount and exactly one populated column group into the active model. The
/// other group is cleared so an update switching types leaves no stale data.
fn apply_income(request: &IncomeRequest, active: &mut income::ActiveModel) -> AppResult<()> {
    active.transaction_date = Set(request.date);
    active.income_type = Set(request.income_type.clone());

    match request.income_type {
        IncomeType::Trip => {
            let trip = request.trip.as_ref().ok_or_else(|| {
                AppError::BadRequest("Trip details are required for TRIP income".to_string())
            })?;
            validate_trip(trip)?;

            let other_expense = trip.other_expense.unwrap_or(Decimal::ZERO);
            active.amount = Set(money::trip_amount(
                trip.onward_amount,
                trip.return_amount,
                trip.driver_salary,
                trip.conductor_salary,
                other_expense,
            ));

            active.trip_number_of_trips = Set(Some(trip.number_of_trips));
            active.trip_onward_amount = Set(Some(trip.onward_amount));
            active.trip_return_amount = Set(Some(trip.return_amount));
            active.trip_other_expense = Set(Some(other_expense));
            active.trip_driver_salary = Set(Some(trip.driver_salary));
            active.trip_conductor_salary = Set(Some(trip.conductor_salary));

            active.hire_number_of_days = Set(None);
            active.hire_origin = Set(None);
            active.hire_destination = Set(None);
            active.hire_amount = Set(None);
            active.hire_other_expense = Set(None);
            active.hire_driver_salary = Set(None);
            active.hire_conductor_salary = Set(None);
        }
        IncomeType::Hire => {
            let hire = request.hire.as_ref().ok_or_else(|| {
                AppError::BadRequest("Hire details are required for HIRE income".to_string())
            })?;
            validate_hire(hire)?;

            let other_expense = hire.other_expense.unwrap_or(Decimal::ZERO);
            active.amount = Set(money::hire_amount(
                hire.hire_amount,
                hire.driver_salary,
                hire.conductor_salary,
                other_expense,
            ));

            active.hire_number_of_days = Set(Some(hire.number_of_days));
            active.hire_origin = Set(Some(hire.origin.clone()));
            active.hire_destination = Set(Some(hire.destination.clone()));
            active.hire_amount = Set(Some(hire.hire_amount));
            active.hire_other_expense = Set(Some(other_expense));
            active.hire_driver_salary = Set(Some(hire.driver_salary));
            active.hire_conductor_salary = Set(Some(hire.conductor_salary));

            active.trip_number_of_trips = Set(None);
            active.trip_onward_amount = Set(None);
            active.trip_return_amount = Set(None);
            active.trip_other_expense = Set(None);
            active.trip_driver_salary = Set(None);
            active.trip_conductor_salary = Set(None);
        }
    }

    Ok(())
}

fn to_response(
    income: income::Model,
    bus_number: String,
    created_by: String,
) -> IncomeResponse {
    let trip = match income.income_type {
        IncomeType::Trip => Some(TripInfo {
            number_of_trips: income.trip_number_of_trips.unwrap_or_default(),
            onward_amount: income.trip_onward_amount.unwrap_or_default(),
            return_amount: income.trip_return_amount.unwrap_or_default(),
            other_expense: income.trip_other_expense.unwrap_or_default(),
            driver_salary: income.trip_driver_salary.unwrap_or_default(),
            conductor_salary: income.trip_conductor_salary.unwrap_or_default(),
        }),
        IncomeType::Hire => None,
    };
    let hire = match income.income_type {
        IncomeType::Hire => Some(HireInfo {
            number_of_days: income.hire_number_of_days.unwrap_or_default(),
            origin: income.hire_origin.clone().unwrap_or_default(),
            destination: income.hire_destination.clone().unwrap_or_default(),
            hire_amount: income.hire_amount.unwrap_or_default(),
            other_expense: income.hire_other_expense.unwrap_or_default(),
            driver_salary: income.hire_driver_salary.unwrap_or_default(),
            conductor_salary: income.hire_conductor_salary.unwrap_or_default(),
        }),
        IncomeType::Trip => None,
    };

    IncomeResponse {
        id: income.id,
        income_type: income.income_type,
        profit_amount: income.amount,
        transaction_date: income.transaction_date,
        bus_id: income.bus_id,
        bus_number,
        created_by,
        trip,
        hire,
        created_at: income.created_at.with_timezone(&Utc),
        updated_at: income.updated_at.with_timezone(&Utc),
    }
}

/// Map a batch of incomes, resolving bus numbers and creator usernames
async fn map_incomes(
    state: &AppState,
    incomes: Vec<income::Model>,
) -> AppResult<Vec<IncomeResponse>> {
    let bus_ids: Vec<Uuid> = incomes.iter().map(|i| i.bus_id).collect();
    let user_ids: Vec<Uuid> = incomes.iter().map(|i| i.created_by).collect();

    let buses = bus::Entity::find()
        .filter(bus::Column::Id.is_in(bus_ids))
        .all(&state.db)
        .await?;
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&state.db)
        .await?;

    Ok(incomes
        .into_iter()
        .map(|i| {
            let bus_number = buses
                .iter()
                .find(|b| b.id == i.bus_id)
                .map(|b| b.bus_number.clone())
                .unwrap_or_default();
            let created_by = users
                .iter()
                .find(|u| u.id == i.created_by)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            to_response(i, bus_number, created_by)
        })
        .collect())
}

/// Record an income entry for a bus
pub async fn add_income(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Json(payload): Json<IncomeRequest>,
) -> AppResult<Json<IncomeResponse>> {
    let bus = access::ensure_bus_access(&state.db, &claims, bus_id).await?;

    let mut active = income::ActiveModel {
        id: Set(Uuid::new_v4()),
        bus_id: Set(bus.id),
        created_by: Set(claims.sub),
        ..Default::default()
    };
    apply_income(&payload, &mut active)?;

    let income = active.insert(&state.db).await?;

    tracing::info!(
        "User {} added {:?} income {} for bus {}",
        claims.username,
        income.income_type,
        income.id,
        bus.bus_number
    );

    Ok(Json(to_response(income, bus.bus_number, claims.username)))
}

/// List incomes across every bus the caller can access
pub async fn list_my_incomes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<IncomeResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let incomes = income::Entity::find()
        .filter(income::Column::BusId.is_in(bus_ids))
        .all(&state.db)
        .await?;

    Ok(Json(map_incomes(&state, incomes).await?))
}

/// List incomes for one bus
pub async fn list_by_bus(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
) -> AppResult<Json<Vec<IncomeResponse>>> {
    access::ensure_bus_access(&state.db, &claims, bus_id).await?;

    let incomes = income::Entity::find()
        .filter(income::Column::BusId.eq(bus_id))
        .all(&state.db)
        .await?;

    Ok(Json(map_incomes(&state, incomes).await?))
}

/// Get a single income entry
pub async fn get_income(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(income_id): Path<Uuid>,
) -> AppResult<Json<IncomeResponse>> {
    let income = income::Entity::find_by_id(income_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Income not found with id: {}", income_id)))?;

    let bus = access::ensure_bus_access(&state.db, &claims, income.bus_id).await?;

    let created_by = user::Entity::find_by_id(income.created_by)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(Json(to_response(income, bus.bus_number, created_by)))
}

/// List incomes in a date range across accessible buses
pub async fn list_by_date_range(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(range): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<IncomeResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let incomes = income::Entity::find()
        .filter(income::Column::BusId.is_in(bus_ids))
        .filter(income::Column::TransactionDate.between(range.start_date, range.end_date))
        .all(&state.db)
        .await?;

    Ok(Json(map_incomes(&state, incomes).await?))
}

/// List incomes in a date range for one bus
pub async fn list_by_bus_and_date_range(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(bus_id): Path<Uuid>,
    Query(range): Query<DateRangeQuery>,
) -> AppResult<Json<Vec<IncomeResponse>>> {
    access::ensure_bus_access(&state.db, &claims, bus_id).await?;

    let incomes = income::Entity::find()
        .filter(income::Column::BusId.eq(bus_id))
        .filter(income::Column::TransactionDate.between(range.start_date, range.end_date))
        .all(&state.db)
        .await?;

    Ok(Json(map_incomes(&state, incomes).await?))
}

/// List incomes of one type across accessible buses
pub async fn list_by_type(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(income_type): Path<IncomeType>,
) -> AppResult<Json<Vec<IncomeResponse>>> {
    let bus_ids = access::accessible_bus_ids(&state.db, &claims).await?;

    let incomes = income::Entity::find()
        .filter(income::Column::BusId.is_in(bus_ids))
        .filter(income::Column::IncomeType.eq(income_type))
        .all(&state.db)
        .await?;

    Ok(Json(map_incomes(&state, incomes).await?))
}

/// Update an income entry (owner, or the conductor who created it)
pub async fn update_income(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(income_id): Path<Uuid>,
    Json(payload): Json<IncomeRequest>,
) -> AppResult<Json<IncomeResponse>> {
    let income = income::Entity::find_by_id(income_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Income not found with id: {}", income_id)))?;

    let bus = access::ensure_bus_access(&state.db, &claims, income.bus_id).await?;
    access::ensure_record_editable(&claims, income.created_by)?;

    let created_by = income.created_by;
    let mut active: income::ActiveModel = income.into();
    apply_income(&payload, &mut active)?;
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&state.db).await?;

    tracing::info!("User {} updated income {}", claims.username, income_id);

    let created_by = user::Entity::find_by_id(created_by)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(Json(to_response(updated, bus.bus_number, created_by)))
}

/// Delete an income entry (owner, or the conductor who created it)
pub async fn delete_income(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(income_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let income = income::Entity::find_by_id(income_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Income not found with id: {}", income_id)))?;

    access::ensure_bus_access(&state.db, &claims, income.bus_id).await?;
    access::ensure_record_editable(&claims, income.created_by)?;

    income::Entity::delete_by_id(income_id)
        .exec(&state.db)
        .await?;

    tracing::info!("User {} deleted income {}", claims.username, income_id);

    Ok(Json(serde_json::json!({ "message": "Income deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::UserRole;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn trip_request(trip: Option<TripIncome>) -> IncomeRequest {
        IncomeRequest {
            income_type: IncomeType::Trip,
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            trip,
            hire: None,
        }
    }

    fn sample_trip() -> TripIncome {
        TripIncome {
            number_of_trips: 2,
            onward_amount: dec(3000),
            return_amount: dec(2500),
            other_expense: Some(dec(200)),
            driver_salary: dec(250),
            conductor_salary: dec(150),
        }
    }

    #[test]
    fn trip_income_computes_net_amount() {
        let mut active = <income::ActiveModel as Default>::default();
        apply_income(&trip_request(Some(sample_trip())), &mut active).unwrap();

        assert_eq!(active.amount.clone().unwrap(), dec(4900));
        assert_eq!(active.trip_other_expense.clone().unwrap(), Some(dec(200)));
        // Hire columns must stay empty for a trip entry
        assert_eq!(active.hire_amount.clone().unwrap(), None);
    }

    #[test]
    fn missing_trip_payload_is_rejected() {
        let mut active = <income::ActiveModel as Default>::default();
        let result = apply_income(&trip_request(None), &mut active);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn trip_count_outside_range_is_rejected() {
        for count in [0, 4] {
            let mut trip = sample_trip();
            trip.number_of_trips = count;
            let mut active = <income::ActiveModel as Default>::default();
            let result = apply_income(&trip_request(Some(trip)), &mut active);
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }
    }

    #[test]
    fn hire_income_defaults_other_expense_to_zero() {
        let request = IncomeRequest {
            income_type: IncomeType::Hire,
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            trip: None,
            hire: Some(HireIncome {
                number_of_days: 3,
                origin: "Colombo".to_string(),
                destination: "Kandy".to_string(),
                hire_amount: dec(8000),
                other_expense: None,
                driver_salary: dec(1500),
                conductor_salary: dec(1000),
            }),
        };

        let mut active = <income::ActiveModel as Default>::default();
        apply_income(&request, &mut active).unwrap();

        assert_eq!(active.amount.clone().unwrap(), dec(5500));
        assert_eq!(active.hire_other_expense.clone().unwrap(), Some(dec(0)));
    }

    #[test]
    fn conductor_cannot_edit_anothers_record() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "conductor".to_string(),
            role: UserRole::Conductor,
            exp: 0,
            iat: 0,
        };

        let result = access::ensure_record_editable(&claims, Uuid::new_v4());
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // The same conductor editing their own record is fine
        access::ensure_record_editable(&claims, claims.sub).unwrap();
    }

    #[test]
    fn owner_can_edit_any_record() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "owner".to_string(),
            role: UserRole::Owner,
            exp: 0,
            iat: 0,
        };

        access::ensure_record_editable(&claims, Uuid::new_v4()).unwrap();
    }
}
