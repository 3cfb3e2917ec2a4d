#![deny(dead_code)]

pub use sea_orm_migration::prelude::*;

mod m20260112_000001_create_table_progress;
mod m20260112_000002_create_table_blocks_raw;
mod m20260112_000003_create_table_transactions_main;
mod m20260112_000004_create_table_transactions_raw;
mod m20260112_000005_create_table_messages_main;
mod m20260112_000006_create_table_events_main;
mod m20260112_000007_create_table_denom_metadata;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        // Order matters: later migrations reference tables created earlier.
        vec![
            Box::new(m20260112_000001_create_table_progress::Migration),
            Box::new(m20260112_000002_create_table_blocks_raw::Migration),
            Box::new(m20260112_000003_create_table_transactions_main::Migration),
            Box::new(m20260112_000004_create_table_transactions_raw::Migration),
            Box::new(m20260112_000005_create_table_messages_main::Migration),
            Box::new(m20260112_000006_create_table_events_main::Migration),
            Box::new(m20260112_000007_create_table_denom_metadata::Migration),
        ]
    }
}
