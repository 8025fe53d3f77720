//! Database migrations for the portability service.
//!
//! Every table the export/import engine knows about is created here, together
//! with the identifier translation store and the import history.

pub use sea_orm_migration::prelude::*;

mod m2024_01_01_000001_create_tenants;
mod m2025_12_01_000100_create_reference_tables;
mod m2025_12_01_000200_create_users_and_organizations;
mod m2025_12_01_000300_create_work_tables;
mod m2025_12_01_000400_create_import_tables;
mod m2025_12_01_000500_create_changelog;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2024_01_01_000001_create_tenants::Migration),
            Box::new(m2025_12_01_000100_create_reference_tables::Migration),
            Box::new(m2025_12_01_000200_create_users_and_organizations::Migration),
            Box::new(m2025_12_01_000300_create_work_tables::Migration),
            Box::new(m2025_12_01_000400_create_import_tables::Migration),
            Box::new(m2025_12_01_000500_create_changelog::Migration),
        ]
    }
}
