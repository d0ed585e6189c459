use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use busbar_domain::report::{FailureReport, Publisher, UNKNOWN};

use crate::domain::repository::{
    AuditSink, BusSender, CausingEventRepository, FailureGroupRepository, FailureRecordRepository,
    PayloadProbe, ReportHandler, RetryPolicy, ScheduledRetryRepository, TaskClient, TaskFactory,
};
use crate::domain::types::{CausingEvent, FailureRecord, FailureState};
use crate::error::{RecoveryError, StoreError};
use crate::usecase::failure::FailureLifecycle;

/// Turns one failure report into a stored, classified failure record.
///
/// Duplicate reports (same idempotence id and reporter) are dropped, the
/// causing message is stored once per external event id, and the record
/// then enters the state machine under its declared temporality.
#[derive(Clone)]
pub struct IngestFailureUseCase<R, C, S, G, T, K, P, A, B, Pr>
where
    R: FailureRecordRepository,
    C: CausingEventRepository,
    S: ScheduledRetryRepository,
    G: FailureGroupRepository,
    T: TaskClient,
    K: TaskFactory,
    P: RetryPolicy,
    A: AuditSink,
    B: BusSender,
    Pr: PayloadProbe,
{
    pub records: R,
    pub events: C,
    pub probe: Pr,
    pub lifecycle: FailureLifecycle<R, C, S, G, T, K, P, A, B>,
}

impl<R, C, S, G, T, K, P, A, B, Pr> IngestFailureUseCase<R, C, S, G, T, K, P, A, B, Pr>
where
    R: FailureRecordRepository,
    C: CausingEventRepository,
    S: ScheduledRetryRepository,
    G: FailureGroupRepository,
    T: TaskClient,
    K: TaskFactory,
    P: RetryPolicy,
    A: AuditSink,
    B: BusSender,
    Pr: PayloadProbe,
{
    pub async fn execute(&self, report: FailureReport) -> Result<(), RecoveryError> {
        let (idempotence_id, reporter) = report.dedup_key();
        if self.records.exists_for_report(idempotence_id, reporter).await? {
            info!(idempotence_id, reporter, "duplicate failure report ignored");
            return Ok(());
        }
        let event = self.resolve_causing_event(&report).await?;
        let record = build_record(&report, &event);
        self.lifecycle.accept(record, &event).await
    }

    /// Store the causing message, converging on one row per external
    /// event id even under concurrent ingestion.
    async fn resolve_causing_event(
        &self,
        report: &FailureReport,
    ) -> Result<CausingEvent, RecoveryError> {
        // Reporters that could not decode the payload leave the metadata
        // out; try to read it from the stored bytes instead.
        let probed = if report.causing.metadata.is_none() {
            self.probe
                .probe_metadata(report.causing.cluster.as_deref(), &report.causing.payload)
        } else {
            None
        };
        let fresh = causing_event_from_report(report, probed);
        let Some(event_id) = fresh.event_id.clone() else {
            // Without an external id there is nothing to converge on.
            self.events.insert(&fresh).await?;
            return Ok(fresh);
        };
        if let Some(existing) = self.events.find_by_event_id(&event_id).await? {
            return Ok(self.refresh(existing, fresh).await?);
        }
        match self.events.insert(&fresh).await {
            Ok(()) => Ok(fresh),
            // A concurrent report for the same message committed first.
            Err(StoreError::Unique(_)) => {
                let existing = self.events.find_by_event_id(&event_id).await?.ok_or_else(|| {
                    RecoveryError::Internal(anyhow::anyhow!(
                        "causing event {event_id} vanished after unique violation"
                    ))
                })?;
                Ok(self.refresh(existing, fresh).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A re-reported message refreshes the stored envelope.
    async fn refresh(
        &self,
        existing: CausingEvent,
        fresh: CausingEvent,
    ) -> Result<CausingEvent, StoreError> {
        let updated = CausingEvent {
            id: existing.id,
            created_at: existing.created_at,
            ..fresh
        };
        self.events.update(&updated).await?;
        Ok(updated)
    }
}

impl<R, C, S, G, T, K, P, A, B, Pr> ReportHandler
    for IngestFailureUseCase<R, C, S, G, T, K, P, A, B, Pr>
where
    R: FailureRecordRepository,
    C: CausingEventRepository,
    S: ScheduledRetryRepository,
    G: FailureGroupRepository,
    T: TaskClient,
    K: TaskFactory,
    P: RetryPolicy,
    A: AuditSink,
    B: BusSender,
    Pr: PayloadProbe,
{
    async fn handle(&self, report: FailureReport) -> Result<(), RecoveryError> {
        self.execute(report).await
    }
}

fn causing_event_from_report(
    report: &FailureReport,
    probed: Option<busbar_domain::report::EventMetadata>,
) -> CausingEvent {
    let metadata = report.causing.metadata.clone().or(probed);
    let (event_id, event_idempotence_id, event_name, event_version, publisher, event_created) =
        match metadata {
            Some(m) => (
                Some(m.event_id),
                Some(m.idempotence_id),
                m.event_type.name,
                m.event_type.version,
                m.publisher,
                m.created,
            ),
            // A reporter that could not decode the message cannot name it.
            // Derive a placeholder identity from the report envelope so a
            // redelivered report still converges on the same row.
            None => (
                Some(format!("{}-causing", report.metadata.event_id)),
                None,
                UNKNOWN.to_owned(),
                None,
                Publisher::new(UNKNOWN),
                None,
            ),
        };
    CausingEvent {
        id: Uuid::now_v7(),
        event_id,
        event_idempotence_id,
        event_name,
        event_version,
        publisher_service: publisher.service,
        publisher_system: publisher.system,
        event_created,
        topic: report.causing.topic.clone(),
        cluster: report.causing.cluster.clone(),
        partition: report.causing.partition,
        offset: report.causing.offset,
        key: report.causing.key.clone(),
        payload: report.causing.payload.clone(),
        headers: report.causing.headers.clone(),
        created_at: Utc::now(),
    }
}

fn build_record(report: &FailureReport, event: &CausingEvent) -> FailureRecord {
    let stack_trace = report
        .error
        .stack_trace
        .as_deref()
        .map(scrub)
        .filter(|t| !t.is_empty());
    FailureRecord {
        id: Uuid::now_v7(),
        // Provisional; classification settles the state before the insert.
        state: FailureState::RetryPending,
        temporality: report.error.temporality,
        error_code: scrub(&report.error.code),
        error_message: scrub(&report.error.message),
        error_description: report.error.description.as_deref().map(scrub),
        stack_hash: stack_trace.as_deref().map(stack_hash),
        stack_trace,
        causing_event_id: event.id,
        group_id: None,
        reporter_service: report.metadata.publisher.service.clone(),
        reporter_system: report.metadata.publisher.system.clone(),
        report_event_id: report.metadata.event_id.clone(),
        report_type_name: report.metadata.event_type.name.clone(),
        report_type_version: report.metadata.event_type.version.clone(),
        report_idempotence_id: report.metadata.idempotence_id.clone(),
        report_created: report.metadata.created,
        closing_reason: None,
        task_id: None,
        trace: report.trace.clone(),
        version: 0,
        created_at: Utc::now(),
        modified_at: None,
    }
}

/// Postgres text columns reject NUL bytes; reporters occasionally relay
/// them inside stack traces. A blank keeps the surrounding text legible.
fn scrub(text: &str) -> String {
    text.replace('\0', " ")
}

fn stack_hash(stack_trace: &str) -> String {
    let digest = Sha256::digest(stack_trace.trim().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
