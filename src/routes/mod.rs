use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{assignments, auth, buses, expenses, incomes, users};
use crate::middleware::auth::{auth_middleware, require_owner};
use crate::middleware::rate_limit::create_public_governor;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // IP-based governor for the unauthenticated endpoints
    let public_governor = create_public_governor();

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor);

    // Owner-only routes (requires auth + owner role)
    let owner_routes = Router::new()
        // Conductor management
        .route("/users/conductors", post(users::create_conductor))
        .route("/users/conductors", get(users::list_conductors))
        .route("/users/conductors/{id}", get(users::get_conductor))
        // Assignment ledger
        .route("/assignments", post(assignments::assign_conductor))
        .route("/assignments", get(assignments::list_my_assignments))
        .route("/assignments/bus/{bus_id}", get(assignments::list_for_bus))
        .route(
            "/assignments/conductor/{conductor_id}",
            get(assignments::list_for_conductor),
        )
        .route("/assignments/{id}/revoke", put(assignments::revoke_assignment))
        .route("/assignments/{id}", delete(assignments::delete_assignment))
        .layer(middleware::from_fn(require_owner))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Fleet routes shared by owners and conductors (per-bus access is
    // enforced inside the handlers)
    let fleet_routes = Router::new()
        // Buses
        .route("/buses", post(buses::create_bus))
        .route("/buses", get(buses::list_buses))
        .route("/buses/{id}", put(buses::update_bus))
        .route("/buses/{id}", delete(buses::delete_bus))
        // Incomes
        .route("/buses/{bus_id}/incomes", post(incomes::add_income))
        .route("/buses/{bus_id}/incomes", get(incomes::list_by_bus))
        .route(
            "/buses/{bus_id}/incomes/range",
            get(incomes::list_by_bus_and_date_range),
        )
        .route("/incomes", get(incomes::list_my_incomes))
        .route("/incomes/range", get(incomes::list_by_date_range))
        .route("/incomes/type/{income_type}", get(incomes::list_by_type))
        .route("/incomes/{id}", get(incomes::get_income))
        .route("/incomes/{id}", put(incomes::update_income))
        .route("/incomes/{id}", delete(incomes::delete_income))
        // Expenses
        .route("/buses/{bus_id}/expenses", post(expenses::add_expense))
        .route("/buses/{bus_id}/expenses", get(expenses::list_by_bus))
        .route(
            "/buses/{bus_id}/expenses/range",
            get(expenses::list_by_bus_and_date_range),
        )
        .route("/expenses", get(expenses::list_my_expenses))
        .route("/expenses/range", get(expenses::list_by_date_range))
        .route(
            "/expenses/category/{category}",
            get(expenses::list_by_category),
        )
        .route("/expenses/{id}", get(expenses::get_expense))
        .route("/expenses/{id}", put(expenses::update_expense))
        .route("/expenses/{id}", delete(expenses::delete_expense))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", owner_routes.merge(fleet_routes))
        .with_state(state)
}
