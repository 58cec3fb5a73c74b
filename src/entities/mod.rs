pub mod bus;
pub mod bus_assignment;
pub mod expense;
pub mod income;
pub mod user;
