pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_members;
mod m20240101_000002_create_wallet_passes;
mod m20240101_000003_create_email_logs;
mod m20260121_000004_add_pass_added_flags;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_members::Migration),
            Box::new(m20240101_000002_create_wallet_passes::Migration),
            Box::new(m20240101_000003_create_email_logs::Migration),
            Box::new(m20260121_000004_add_pass_added_flags::Migration),
        ]
    }
}
