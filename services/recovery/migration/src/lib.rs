use sea_orm_migration::prelude::*;

mod m20260601_000001_create_causing_events;
mod m20260601_000002_create_event_headers;
mod m20260601_000003_create_failure_groups;
mod m20260601_000004_create_failure_records;
mod m20260601_000005_create_scheduled_retries;
mod m20260601_000006_create_audit_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_000001_create_causing_events::Migration),
            Box::new(m20260601_000002_create_event_headers::Migration),
            Box::new(m20260601_000003_create_failure_groups::Migration),
            Box::new(m20260601_000004_create_failure_records::Migration),
            Box::new(m20260601_000005_create_scheduled_retries::Migration),
            Box::new(m20260601_000006_create_audit_entries::Migration),
        ]
    }
}
