use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use busbar_domain::temporality::Temporality;

use crate::domain::repository::{
    AuditSink, BusSender, CausingEventRepository, FailureGroupRepository, FailureRecordRepository,
    ManualTaskDriver, ResendExecutor, RetryPolicy, ScheduledRetryRepository, TaskClient,
    TaskFactory,
};
use crate::domain::types::{CausingEvent, FailureRecord, FailureState, ScheduledRetry};
use crate::error::RecoveryError;
use crate::usecase::group::GroupDeduplicator;
use crate::usecase::replay::EventReplayer;

/// Longest accepted closing reason, in characters.
pub const MAX_CLOSING_REASON_LEN: usize = 1000;

/// The failure state machine.
///
/// Every transition of a failure record runs through here: classification
/// of fresh records, scheduled and manual resends, deletion, and the task
/// operations parked records are re-driven through. Task-system outages
/// never fail a transition; the record stays in its awaiting state and the
/// synchronizer picks it up again.
#[derive(Clone)]
pub struct FailureLifecycle<R, C, S, G, T, K, P, A, B>
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
{
    pub records: R,
    pub events: C,
    pub retries: S,
    pub groups: GroupDeduplicator<G>,
    pub tasks: T,
    pub task_factory: K,
    pub policy: P,
    pub audit: A,
    pub replayer: EventReplayer<B>,
}

impl<R, C, S, G, T, K, P, A, B> FailureLifecycle<R, C, S, G, T, K, P, A, B>
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
{
    /// Entry point for a freshly built, not yet persisted record.
    pub async fn accept(
        &self,
        mut record: FailureRecord,
        event: &CausingEvent,
    ) -> Result<(), RecoveryError> {
        match record.temporality {
            Temporality::Temporary => self.classify_temporary(&mut record, event).await,
            // Unclassifiable failures take the conservative path: a human
            // looks at them.
            Temporality::Permanent | Temporality::Unknown => {
                self.classify_permanent(&mut record, event).await
            }
        }
    }

    /// Persist as retry-pending with a scheduled attempt, or hand over to
    /// the permanent path once the retry budget is spent.
    pub async fn classify_temporary(
        &self,
        record: &mut FailureRecord,
        event: &CausingEvent,
    ) -> Result<(), RecoveryError> {
        let now = Utc::now();
        let prior_failures = match event.event_id.as_deref() {
            Some(event_id) => self.records.count_for_causing_event(event_id).await?,
            None => 0,
        };
        let Some(due_at) = self.policy.next_attempt(prior_failures, record, event, now) else {
            info!(
                record_id = %record.id,
                prior_failures,
                "retry budget exhausted, treating failure as permanent"
            );
            return self.classify_permanent(record, event).await;
        };
        record.state = FailureState::RetryPending;
        let retry = ScheduledRetry::new(record.id, due_at, now);
        self.records.insert_with_retry(record, &retry).await?;
        info!(record_id = %record.id, due_at = %due_at, "failure recorded, retry scheduled");
        Ok(())
    }

    /// Persist as awaiting a manual task, grouped by signature, and try to
    /// open the task right away.
    pub async fn classify_permanent(
        &self,
        record: &mut FailureRecord,
        event: &CausingEvent,
    ) -> Result<(), RecoveryError> {
        record.state = FailureState::AwaitingManualTask;
        record.group_id = self.groups.assign(record, event).await?;
        self.records.insert(record).await?;
        info!(record_id = %record.id, group_id = ?record.group_id, "failure recorded for manual handling");
        self.open_manual_task_inner(record).await
    }

    /// Operator-triggered resend, allowed in the three live states.
    pub async fn manual_resend(&self, id: Uuid) -> Result<(), RecoveryError> {
        let mut record = self
            .records
            .find_by_id(id)
            .await?
            .ok_or(RecoveryError::RecordNotFound)?;
        if !matches!(
            record.state,
            FailureState::RetryPending
                | FailureState::AwaitingManualTask
                | FailureState::OpenManualTask
        ) {
            return Err(RecoveryError::NotRetryable(record.state));
        }
        let event = self.causing_event(record.causing_event_id).await?;
        self.replayer.replay(&record, &event).await?;
        self.audit.log_resend(&record).await;
        if record.state == FailureState::RetryPending {
            // The manual resend supersedes whatever was scheduled.
            self.retries.cancel_for_record(record.id).await?;
        }
        self.mark_retried(&mut record).await
    }

    /// Advance a record after its causing message was put back on the bus.
    pub async fn mark_retried(&self, record: &mut FailureRecord) -> Result<(), RecoveryError> {
        match record.state {
            FailureState::RetryPending => {
                record.state = FailureState::RetriedAfterTemporary;
                self.records.update(record).await?;
                Ok(())
            }
            FailureState::AwaitingManualTask => {
                record.state = FailureState::RetriedAfterPermanent;
                self.records.update(record).await?;
                Ok(())
            }
            FailureState::OpenManualTask => {
                record.state = FailureState::AwaitingTaskClose;
                self.records.update(record).await?;
                self.close_manual_task_inner(record).await
            }
            // A resend can land while a task deletion is still parked on
            // the task system; the declared temporality decides where the
            // record ends up.
            FailureState::AwaitingTaskDelete => {
                record.state = match record.temporality {
                    Temporality::Temporary => FailureState::RetriedAfterTemporary,
                    Temporality::Permanent => FailureState::RetriedAfterPermanent,
                    Temporality::Unknown => {
                        return Err(RecoveryError::NotRetryable(FailureState::AwaitingTaskDelete));
                    }
                };
                self.records.update(record).await?;
                Ok(())
            }
            other => Err(RecoveryError::NotRetryable(other)),
        }
    }

    /// Close a failure without resending it.
    pub async fn delete(&self, id: Uuid, reason: Option<&str>) -> Result<(), RecoveryError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if let Some(reason) = reason {
            if reason.chars().count() > MAX_CLOSING_REASON_LEN {
                return Err(RecoveryError::Validation(format!(
                    "closing reason exceeds {MAX_CLOSING_REASON_LEN} characters"
                )));
            }
        }
        let mut record = self
            .records
            .find_by_id(id)
            .await?
            .ok_or(RecoveryError::RecordNotFound)?;
        record.closing_reason = reason.map(str::to_owned);
        match record.state {
            FailureState::RetryPending => {
                self.retries.cancel_for_record(record.id).await?;
                record.state = FailureState::Closed;
                self.records.update(&mut record).await?;
                self.audit.log_delete(&record).await;
                info!(record_id = %record.id, "failure closed, retry cancelled");
                Ok(())
            }
            FailureState::AwaitingManualTask => {
                record.state = FailureState::Closed;
                self.records.update(&mut record).await?;
                self.audit.log_delete(&record).await;
                info!(record_id = %record.id, "failure closed");
                Ok(())
            }
            FailureState::OpenManualTask => {
                record.state = FailureState::AwaitingTaskDelete;
                self.records.update(&mut record).await?;
                self.audit.log_delete(&record).await;
                self.delete_manual_task_inner(&mut record).await
            }
            other => Err(RecoveryError::NotDeletable(other)),
        }
    }

    async fn open_manual_task_inner(&self, record: &mut FailureRecord) -> Result<(), RecoveryError> {
        if record.state != FailureState::AwaitingManualTask {
            return Err(RecoveryError::TaskPrecondition {
                expected: FailureState::AwaitingManualTask,
                actual: record.state,
            });
        }
        let event = self.causing_event(record.causing_event_id).await?;
        let descriptor = self.task_factory.describe(record, &event);
        match self.tasks.create_task(&descriptor).await {
            Ok(task_id) => {
                record.task_id = Some(task_id);
                record.state = FailureState::OpenManualTask;
                self.records.update(record).await?;
                info!(record_id = %record.id, task_id = %task_id, "opened manual task");
                Ok(())
            }
            Err(err) => {
                warn!(
                    record_id = %record.id,
                    error = %err,
                    "task system unavailable, record stays parked"
                );
                Ok(())
            }
        }
    }

    async fn close_manual_task_inner(
        &self,
        record: &mut FailureRecord,
    ) -> Result<(), RecoveryError> {
        if record.state != FailureState::AwaitingTaskClose {
            return Err(RecoveryError::TaskPrecondition {
                expected: FailureState::AwaitingTaskClose,
                actual: record.state,
            });
        }
        let Some(task_id) = record.task_id else {
            return Err(RecoveryError::Internal(anyhow::anyhow!(
                "record {} awaits a task close but has no task id",
                record.id
            )));
        };
        match self.tasks.close_task(task_id).await {
            Ok(()) => {
                record.state = FailureState::RetriedAfterPermanent;
                self.records.update(record).await?;
                info!(record_id = %record.id, task_id = %task_id, "closed manual task");
                Ok(())
            }
            Err(err) => {
                warn!(
                    record_id = %record.id,
                    error = %err,
                    "task system unavailable, close stays pending"
                );
                Ok(())
            }
        }
    }

    async fn delete_manual_task_inner(
        &self,
        record: &mut FailureRecord,
    ) -> Result<(), RecoveryError> {
        if record.state != FailureState::AwaitingTaskDelete {
            return Err(RecoveryError::TaskPrecondition {
                expected: FailureState::AwaitingTaskDelete,
                actual: record.state,
            });
        }
        let Some(task_id) = record.task_id else {
            return Err(RecoveryError::Internal(anyhow::anyhow!(
                "record {} awaits a task delete but has no task id",
                record.id
            )));
        };
        match self.tasks.close_task(task_id).await {
            Ok(()) => {
                record.state = FailureState::Closed;
                self.records.update(record).await?;
                info!(record_id = %record.id, task_id = %task_id, "closed task after deletion");
                Ok(())
            }
            Err(err) => {
                warn!(
                    record_id = %record.id,
                    error = %err,
                    "task system unavailable, task delete stays pending"
                );
                Ok(())
            }
        }
    }

    async fn causing_event(&self, id: Uuid) -> Result<CausingEvent, RecoveryError> {
        self.events.find_by_id(id).await?.ok_or_else(|| {
            RecoveryError::Internal(anyhow::anyhow!("causing event {id} missing for stored record"))
        })
    }
}

impl<R, C, S, G, T, K, P, A, B> ResendExecutor for FailureLifecycle<R, C, S, G, T, K, P, A, B>
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
{
    /// Run one claimed retry job.
    ///
    /// The job is resolved exactly once no matter the outcome; a failed
    /// replay chains a fresh record through temporary classification so
    /// the backoff keeps growing.
    async fn scheduled_resend(&self, job: &ScheduledRetry) -> Result<(), RecoveryError> {
        let now = Utc::now();
        let Some(mut record) = self.records.find_by_id(job.failure_record_id).await? else {
            warn!(job_id = %job.id, "retry job without a record, resolving");
            self.retries.resolve(job.id, now).await?;
            return Ok(());
        };
        if record.state != FailureState::RetryPending {
            // Resolved through another path since scheduling; nothing to do.
            self.retries.resolve(job.id, now).await?;
            return Ok(());
        }
        let event = self.causing_event(record.causing_event_id).await?;
        match self.replayer.replay(&record, &event).await {
            Ok(()) => {
                self.mark_retried(&mut record).await?;
                self.retries.resolve(job.id, now).await?;
                Ok(())
            }
            Err(err) => {
                warn!(
                    record_id = %record.id,
                    error = %err,
                    "scheduled replay failed, chaining a new attempt"
                );
                // The attempt happened; the job is done either way.
                self.retries.resolve(job.id, now).await?;
                let mut chained = record.clone_for_retry(now);
                self.classify_temporary(&mut chained, &event).await
            }
        }
    }
}

impl<R, C, S, G, T, K, P, A, B> ManualTaskDriver for FailureLifecycle<R, C, S, G, T, K, P, A, B>
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
{
    async fn open_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError> {
        self.open_manual_task_inner(record).await
    }

    async fn close_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError> {
        self.close_manual_task_inner(record).await
    }

    async fn delete_manual_task(&self, record: &mut FailureRecord) -> Result<(), RecoveryError> {
        self.delete_manual_task_inner(record).await
    }
}
