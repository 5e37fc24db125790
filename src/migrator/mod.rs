use sea_orm_migration::prelude::*;

mod m20250301_000001_create_users;
mod m20250301_000002_create_farm_records;
mod m20250308_000001_create_environmental_and_alerts;
mod m20250315_000001_create_history_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users::Migration),
            Box::new(m20250301_000002_create_farm_records::Migration),
            Box::new(m20250308_000001_create_environmental_and_alerts::Migration),
            Box::new(m20250315_000001_create_history_entries::Migration),
        ]
    }
}
