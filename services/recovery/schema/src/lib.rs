//! sea-orm entities owned by the recovery service.

pub mod audit_entries;
pub mod causing_events;
pub mod event_headers;
pub mod failure_groups;
pub mod failure_records;
pub mod scheduled_retries;
