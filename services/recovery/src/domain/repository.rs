#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use busbar_domain::pagination::Page;
use busbar_domain::report::{EventMetadata, FailureReport};

use crate::domain::types::{
    CausingEvent, FailureGroup, FailureRecord, FailureState, GroupKey, IncomingEnvelope,
    OutboundRecord, ScheduledRetry, TaskDescriptor,
};
use crate::error::{BusError, RecoveryError, StoreError, TaskError};

// ── Store ports ──────────────────────────────────────────────────────────────

/// Repository for failure records.
pub trait FailureRecordRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureRecord>, StoreError>;

    /// Whether any record already carries this report identity.
    async fn exists_for_report(
        &self,
        idempotence_id: &str,
        reporter_service: &str,
    ) -> Result<bool, StoreError>;

    async fn insert(&self, record: &FailureRecord) -> Result<(), StoreError>;

    /// Insert a record together with its scheduled retry in one transaction.
    async fn insert_with_retry(
        &self,
        record: &FailureRecord,
        retry: &ScheduledRetry,
    ) -> Result<(), StoreError>;

    /// Version-guarded update; bumps `version`/`modified_at` on the passed
    /// record. `StoreError::Conflict` when the row moved on concurrently.
    async fn update(&self, record: &mut FailureRecord) -> Result<(), StoreError>;

    /// Number of records referencing the given external causing-event id.
    async fn count_for_causing_event(&self, event_id: &str) -> Result<u64, StoreError>;

    /// Records in a state, newest first.
    async fn list_by_state(
        &self,
        state: FailureState,
        page: Page,
    ) -> Result<Vec<FailureRecord>, StoreError>;

    async fn count_by_state(&self, state: FailureState) -> Result<u64, StoreError>;
}

/// Repository for stored causing events.
pub trait CausingEventRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CausingEvent>, StoreError>;

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<CausingEvent>, StoreError>;

    /// `StoreError::Unique` when a concurrent inserter stored the same
    /// external event id first.
    async fn insert(&self, event: &CausingEvent) -> Result<(), StoreError>;

    /// Refresh the stored envelope and metadata from a newer report.
    async fn update(&self, event: &CausingEvent) -> Result<(), StoreError>;
}

/// Repository for failure groups.
pub trait FailureGroupRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureGroup>, StoreError>;

    async fn find_by_key(&self, key: &GroupKey) -> Result<Option<FailureGroup>, StoreError>;

    /// `StoreError::Unique` when a concurrent inserter created the same
    /// signature first.
    async fn insert(&self, group: &FailureGroup) -> Result<(), StoreError>;

    /// Returns `false` when no such group exists.
    async fn update_ticket(&self, id: Uuid, ticket: Option<&str>) -> Result<bool, StoreError>;

    /// Returns `false` when no such group exists.
    async fn update_note(&self, id: Uuid, note: Option<&str>) -> Result<bool, StoreError>;
}

/// Repository for scheduled retries.
pub trait ScheduledRetryRepository: Send + Sync {
    async fn insert(&self, retry: &ScheduledRetry) -> Result<(), StoreError>;

    /// Active, unclaimed jobs due at or before `now`, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<ScheduledRetry>, StoreError>;

    /// Conditionally take ownership of a job before processing it. `false`
    /// when another instance claimed it, or it was cancelled or resolved,
    /// since it was read.
    async fn claim(&self, id: Uuid, version: i32, now: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Cancel a record's active retries. Returns how many were cancelled.
    async fn cancel_for_record(&self, failure_record_id: Uuid) -> Result<u64, StoreError>;
}

/// Fire-and-forget audit sink; implementations absorb their own failures.
pub trait AuditSink: Send + Sync {
    async fn log_resend(&self, record: &FailureRecord);
    async fn log_delete(&self, record: &FailureRecord);
}

// ── External collaborator ports ──────────────────────────────────────────────

/// Client for the external human-workflow system.
pub trait TaskClient: Send + Sync {
    async fn create_task(&self, descriptor: &TaskDescriptor) -> Result<Uuid, TaskError>;
    async fn close_task(&self, task_id: Uuid) -> Result<(), TaskError>;
}

/// Builds the manual-task description shown to operators.
pub trait TaskFactory: Send + Sync {
    fn describe(&self, record: &FailureRecord, event: &CausingEvent) -> TaskDescriptor;
}

/// Decides when (and whether) to retry a temporary failure.
pub trait RetryPolicy: Send + Sync {
    /// `None` means stop retrying and treat the failure as permanent.
    fn next_attempt(
        &self,
        prior_failures: u64,
        record: &FailureRecord,
        event: &CausingEvent,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>>;
}

/// Sends raw records to a bus cluster.
pub trait BusSender: Send + Sync {
    async fn send(&self, record: &OutboundRecord) -> Result<(), BusError>;
}

/// Pull-based source of consumed messages (report topic or dead-letter).
pub trait ReportSource: Send + Sync {
    /// Next envelope, or `None` when the source is currently empty.
    async fn next(&mut self) -> Result<Option<IncomingEnvelope>, BusError>;

    /// Acknowledge the envelope returned by the last `next`.
    async fn ack(&mut self) -> Result<(), BusError>;
}

/// Best-effort reader of platform envelope metadata from stored payloads.
pub trait PayloadProbe: Send + Sync {
    fn probe_metadata(&self, cluster: Option<&str>, payload: &[u8]) -> Option<EventMetadata>;
}

// ── Service seams ────────────────────────────────────────────────────────────

/// Handles one decoded failure report end to end.
pub trait ReportHandler: Send + Sync {
    async fn handle(&self, report: FailureReport) -> Result<(), RecoveryError>;
}

/// Executes the resend of one claimed scheduled retry.
pub trait ResendExecutor: Send + Sync {
    async fn scheduled_resend(&self, job: &ScheduledRetry) -> Result<(), RecoveryError>;
}

/// Re-drives task-system operations for records parked in awaiting states.
pub trait ManualTaskDriver: Send + Sync {
    async fn open_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError>;
    async fn close_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError>;
    async fn delete_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError>;
}
