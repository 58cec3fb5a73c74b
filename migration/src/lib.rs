pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_users;
mod m20250301_000002_create_buses;
mod m20250301_000003_create_bus_assignments;
mod m20250301_000004_create_incomes;
mod m20250301_000005_create_expenses;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users::Migration),
            Box::new(m20250301_000002_create_buses::Migration),
            Box::new(m20250301_000003_create_bus_assignments::Migration),
            Box::new(m20250301_000004_create_incomes::Migration),
            Box::new(m20250301_000005_create_expenses::Migration),
        ]
    }
}
