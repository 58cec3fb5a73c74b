pub mod assignments;
pub mod auth;
pub mod buses;
pub mod expenses;
pub mod incomes;
pub mod users;
