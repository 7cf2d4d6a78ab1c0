//! Миграции схемы коллектора.

pub use sea_orm_migration::prelude::*;

mod m001_create_servers;
mod m002_create_registration_codes;
mod m003_create_metric_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_create_servers::Migration),
            Box::new(m002_create_registration_codes::Migration),
            Box::new(m003_create_metric_tables::Migration),
        ]
    }
}
