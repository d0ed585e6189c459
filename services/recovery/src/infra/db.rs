use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionError, TransactionTrait,
};
use tracing::warn;
use uuid::Uuid;

use busbar_core::sea_ext::DbErrExt as _;
use busbar_domain::pagination::Page;
use busbar_domain::report::Header;
use busbar_domain::trace::TraceContext;
use busbar_recovery_schema::{
    audit_entries, causing_events, event_headers, failure_groups, failure_records,
    scheduled_retries,
};

use crate::domain::repository::{
    AuditSink, CausingEventRepository, FailureGroupRepository, FailureRecordRepository,
    ScheduledRetryRepository,
};
use crate::domain::types::{
    AuditAction, CausingEvent, FailureGroup, FailureRecord, FailureState, GroupKey, ScheduledRetry,
};
use crate::error::StoreError;

/// SQLSTATEs the listener treats as transient store trouble.
const SQLSTATE_READ_ONLY: &str = "25006";
const SQLSTATE_LOCK_TIMEOUT: &str = "55P03";
const SQLSTATE_QUERY_CANCELLED: &str = "57014";

/// Classify a database error for the fault-handling paths upstream.
fn store_err(context: &'static str, err: DbErr) -> StoreError {
    if err.is_unique_violation() {
        return StoreError::Unique(context.to_owned());
    }
    let connection_lost = err.is_connection_lost();
    let sql_state = err.sql_state();
    let source = anyhow::Error::new(err).context(context);
    if connection_lost {
        return StoreError::ConnectionLost(source);
    }
    match sql_state.as_deref() {
        Some(SQLSTATE_QUERY_CANCELLED) => StoreError::QueryTimeout(source),
        Some(SQLSTATE_LOCK_TIMEOUT) => StoreError::LockTimeout(source),
        Some(SQLSTATE_READ_ONLY) => StoreError::ReadOnly(source),
        _ => StoreError::Other(source),
    }
}

fn store_txn_err(context: &'static str, err: TransactionError<DbErr>) -> StoreError {
    match err {
        TransactionError::Connection(e) | TransactionError::Transaction(e) => {
            store_err(context, e)
        }
    }
}

// ── Failure record repository ────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbFailureRecordRepository {
    pub db: DatabaseConnection,
}

impl FailureRecordRepository for DbFailureRecordRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureRecord>, StoreError> {
        let model = failure_records::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| store_err("find failure record by id", e))?;
        model.map(record_from_model).transpose()
    }

    async fn exists_for_report(
        &self,
        idempotence_id: &str,
        reporter_service: &str,
    ) -> Result<bool, StoreError> {
        let count = failure_records::Entity::find()
            .filter(failure_records::Column::ReportIdempotenceId.eq(idempotence_id))
            .filter(failure_records::Column::ReporterService.eq(reporter_service))
            .count(&self.db)
            .await
            .map_err(|e| store_err("count records for report identity", e))?;
        Ok(count > 0)
    }

    async fn insert(&self, record: &FailureRecord) -> Result<(), StoreError> {
        record_active_model(record)
            .insert(&self.db)
            .await
            .map_err(|e| store_err("insert failure record", e))?;
        Ok(())
    }

    async fn insert_with_retry(
        &self,
        record: &FailureRecord,
        retry: &ScheduledRetry,
    ) -> Result<(), StoreError> {
        let record_model = record_active_model(record);
        let retry_model = retry_active_model(retry);
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                Box::pin(async move {
                    record_model.insert(txn).await?;
                    retry_model.insert(txn).await?;
                    Ok(())
                })
            })
            .await
            .map_err(|e| store_txn_err("insert failure record with retry", e))?;
        Ok(())
    }

    async fn update(&self, record: &mut FailureRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = failure_records::Entity::update_many()
            .set(failure_records::ActiveModel {
                state: Set(record.state.as_str().to_owned()),
                group_id: Set(record.group_id),
                closing_reason: Set(record.closing_reason.clone()),
                task_id: Set(record.task_id),
                version: Set(record.version + 1),
                modified_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(failure_records::Column::Id.eq(record.id))
            .filter(failure_records::Column::Version.eq(record.version))
            .exec(&self.db)
            .await
            .map_err(|e| store_err("update failure record", e))?;
        if result.rows_affected == 0 {
            return Err(StoreError::Conflict);
        }
        record.version += 1;
        record.modified_at = Some(now);
        Ok(())
    }

    async fn count_for_causing_event(&self, event_id: &str) -> Result<u64, StoreError> {
        failure_records::Entity::find()
            .inner_join(causing_events::Entity)
            .filter(causing_events::Column::EventId.eq(event_id))
            .count(&self.db)
            .await
            .map_err(|e| store_err("count records for causing event", e))
    }

    async fn list_by_state(
        &self,
        state: FailureState,
        page: Page,
    ) -> Result<Vec<FailureRecord>, StoreError> {
        let models = failure_records::Entity::find()
            .filter(failure_records::Column::State.eq(state.as_str()))
            .order_by_desc(failure_records::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(|e| store_err("list failure records by state", e))?;
        models.into_iter().map(record_from_model).collect()
    }

    async fn count_by_state(&self, state: FailureState) -> Result<u64, StoreError> {
        failure_records::Entity::find()
            .filter(failure_records::Column::State.eq(state.as_str()))
            .count(&self.db)
            .await
            .map_err(|e| store_err("count failure records by state", e))
    }
}

fn record_active_model(record: &FailureRecord) -> failure_records::ActiveModel {
    failure_records::ActiveModel {
        id: Set(record.id),
        state: Set(record.state.as_str().to_owned()),
        temporality: Set(record.temporality.as_str().to_owned()),
        error_code: Set(record.error_code.clone()),
        error_message: Set(record.error_message.clone()),
        error_description: Set(record.error_description.clone()),
        stack_trace: Set(record.stack_trace.clone()),
        stack_hash: Set(record.stack_hash.clone()),
        causing_event_id: Set(record.causing_event_id),
        group_id: Set(record.group_id),
        reporter_service: Set(record.reporter_service.clone()),
        reporter_system: Set(record.reporter_system.clone()),
        report_event_id: Set(record.report_event_id.clone()),
        report_type_name: Set(record.report_type_name.clone()),
        report_type_version: Set(record.report_type_version.clone()),
        report_idempotence_id: Set(record.report_idempotence_id.clone()),
        report_created: Set(record.report_created),
        closing_reason: Set(record.closing_reason.clone()),
        task_id: Set(record.task_id),
        trace_id: Set(record.trace.as_ref().map(|t| t.trace_id.clone())),
        span_id: Set(record.trace.as_ref().map(|t| t.span_id.clone())),
        version: Set(record.version),
        created_at: Set(record.created_at),
        modified_at: Set(record.modified_at),
    }
}

fn record_from_model(model: failure_records::Model) -> Result<FailureRecord, StoreError> {
    let state = model.state.parse().map_err(anyhow::Error::new)?;
    let temporality = model.temporality.parse().map_err(anyhow::Error::new)?;
    let trace = match (model.trace_id, model.span_id) {
        (Some(trace_id), Some(span_id)) => Some(TraceContext::new(trace_id, span_id)),
        _ => None,
    };
    Ok(FailureRecord {
        id: model.id,
        state,
        temporality,
        error_code: model.error_code,
        error_message: model.error_message,
        error_description: model.error_description,
        stack_trace: model.stack_trace,
        stack_hash: model.stack_hash,
        causing_event_id: model.causing_event_id,
        group_id: model.group_id,
        reporter_service: model.reporter_service,
        reporter_system: model.reporter_system,
        report_event_id: model.report_event_id,
        report_type_name: model.report_type_name,
        report_type_version: model.report_type_version,
        report_idempotence_id: model.report_idempotence_id,
        report_created: model.report_created,
        closing_reason: model.closing_reason,
        task_id: model.task_id,
        trace,
        version: model.version,
        created_at: model.created_at,
        modified_at: model.modified_at,
    })
}

// ── Causing event repository ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbCausingEventRepository {
    pub db: DatabaseConnection,
}

impl DbCausingEventRepository {
    async fn headers_for(&self, causing_event_id: Uuid) -> Result<Vec<Header>, StoreError> {
        let models = event_headers::Entity::find()
            .filter(event_headers::Column::CausingEventId.eq(causing_event_id))
            .order_by_asc(event_headers::Column::Position)
            .all(&self.db)
            .await
            .map_err(|e| store_err("list event headers", e))?;
        Ok(models
            .into_iter()
            .map(|m| Header::new(m.name, m.value))
            .collect())
    }
}

impl CausingEventRepository for DbCausingEventRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CausingEvent>, StoreError> {
        let Some(model) = causing_events::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| store_err("find causing event by id", e))?
        else {
            return Ok(None);
        };
        let headers = self.headers_for(model.id).await?;
        Ok(Some(event_from_model(model, headers)))
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<CausingEvent>, StoreError> {
        let Some(model) = causing_events::Entity::find()
            .filter(causing_events::Column::EventId.eq(event_id))
            .one(&self.db)
            .await
            .map_err(|e| store_err("find causing event by event id", e))?
        else {
            return Ok(None);
        };
        let headers = self.headers_for(model.id).await?;
        Ok(Some(event_from_model(model, headers)))
    }

    async fn insert(&self, event: &CausingEvent) -> Result<(), StoreError> {
        let event_model = event_active_model(event);
        let header_models = header_active_models(event);
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                Box::pin(async move {
                    event_model.insert(txn).await?;
                    if !header_models.is_empty() {
                        event_headers::Entity::insert_many(header_models)
                            .exec(txn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| store_txn_err("insert causing event", e))?;
        Ok(())
    }

    async fn update(&self, event: &CausingEvent) -> Result<(), StoreError> {
        let id = event.id;
        let event_model = causing_events::ActiveModel {
            event_idempotence_id: Set(event.event_idempotence_id.clone()),
            event_name: Set(event.event_name.clone()),
            event_version: Set(event.event_version.clone()),
            publisher_service: Set(event.publisher_service.clone()),
            publisher_system: Set(event.publisher_system.clone()),
            event_created: Set(event.event_created),
            topic: Set(event.topic.clone()),
            cluster_name: Set(event.cluster.clone()),
            partition: Set(event.partition),
            message_offset: Set(event.offset),
            message_key: Set(event.key.clone()),
            payload: Set(event.payload.clone()),
            ..Default::default()
        };
        let header_models = header_active_models(event);
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                Box::pin(async move {
                    causing_events::Entity::update_many()
                        .set(event_model)
                        .filter(causing_events::Column::Id.eq(id))
                        .exec(txn)
                        .await?;
                    event_headers::Entity::delete_many()
                        .filter(event_headers::Column::CausingEventId.eq(id))
                        .exec(txn)
                        .await?;
                    if !header_models.is_empty() {
                        event_headers::Entity::insert_many(header_models)
                            .exec(txn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| store_txn_err("update causing event", e))?;
        Ok(())
    }
}

fn event_active_model(event: &CausingEvent) -> causing_events::ActiveModel {
    causing_events::ActiveModel {
        id: Set(event.id),
        event_id: Set(event.event_id.clone()),
        event_idempotence_id: Set(event.event_idempotence_id.clone()),
        event_name: Set(event.event_name.clone()),
        event_version: Set(event.event_version.clone()),
        publisher_service: Set(event.publisher_service.clone()),
        publisher_system: Set(event.publisher_system.clone()),
        event_created: Set(event.event_created),
        topic: Set(event.topic.clone()),
        cluster_name: Set(event.cluster.clone()),
        partition: Set(event.partition),
        message_offset: Set(event.offset),
        message_key: Set(event.key.clone()),
        payload: Set(event.payload.clone()),
        created_at: Set(event.created_at),
    }
}

fn header_active_models(event: &CausingEvent) -> Vec<event_headers::ActiveModel> {
    event
        .headers
        .iter()
        .enumerate()
        .map(|(position, h)| event_headers::ActiveModel {
            id: Set(Uuid::now_v7()),
            causing_event_id: Set(event.id),
            position: Set(position as i32),
            name: Set(h.name.clone()),
            value: Set(h.value.clone()),
        })
        .collect()
}

fn event_from_model(model: causing_events::Model, headers: Vec<Header>) -> CausingEvent {
    CausingEvent {
        id: model.id,
        event_id: model.event_id,
        event_idempotence_id: model.event_idempotence_id,
        event_name: model.event_name,
        event_version: model.event_version,
        publisher_service: model.publisher_service,
        publisher_system: model.publisher_system,
        event_created: model.event_created,
        topic: model.topic,
        cluster: model.cluster_name,
        partition: model.partition,
        offset: model.message_offset,
        key: model.message_key,
        payload: model.payload,
        headers,
        created_at: model.created_at,
    }
}

// ── Failure group repository ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbFailureGroupRepository {
    pub db: DatabaseConnection,
}

impl FailureGroupRepository for DbFailureGroupRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureGroup>, StoreError> {
        let model = failure_groups::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| store_err("find failure group by id", e))?;
        Ok(model.map(group_from_model))
    }

    async fn find_by_key(&self, key: &GroupKey) -> Result<Option<FailureGroup>, StoreError> {
        let model = failure_groups::Entity::find()
            .filter(failure_groups::Column::ErrorCode.eq(&key.error_code))
            .filter(failure_groups::Column::EventName.eq(&key.event_name))
            .filter(failure_groups::Column::SourceService.eq(&key.source_service))
            .filter(failure_groups::Column::StackHash.eq(&key.stack_hash))
            .one(&self.db)
            .await
            .map_err(|e| store_err("find failure group by key", e))?;
        Ok(model.map(group_from_model))
    }

    async fn insert(&self, group: &FailureGroup) -> Result<(), StoreError> {
        failure_groups::ActiveModel {
            id: Set(group.id),
            error_code: Set(group.key.error_code.clone()),
            event_name: Set(group.key.event_name.clone()),
            source_service: Set(group.key.source_service.clone()),
            stack_hash: Set(group.key.stack_hash.clone()),
            error_message: Set(group.error_message.clone()),
            ticket: Set(group.ticket.clone()),
            note: Set(group.note.clone()),
            created_at: Set(group.created_at),
            modified_at: Set(group.modified_at),
        }
        .insert(&self.db)
        .await
        .map_err(|e| store_err("insert failure group", e))?;
        Ok(())
    }

    async fn update_ticket(&self, id: Uuid, ticket: Option<&str>) -> Result<bool, StoreError> {
        let result = failure_groups::Entity::update_many()
            .set(failure_groups::ActiveModel {
                ticket: Set(ticket.map(str::to_owned)),
                modified_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(failure_groups::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| store_err("update group ticket", e))?;
        Ok(result.rows_affected > 0)
    }

    async fn update_note(&self, id: Uuid, note: Option<&str>) -> Result<bool, StoreError> {
        let result = failure_groups::Entity::update_many()
            .set(failure_groups::ActiveModel {
                note: Set(note.map(str::to_owned)),
                modified_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(failure_groups::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| store_err("update group note", e))?;
        Ok(result.rows_affected > 0)
    }
}

fn group_from_model(model: failure_groups::Model) -> FailureGroup {
    FailureGroup {
        id: model.id,
        key: GroupKey {
            error_code: model.error_code,
            event_name: model.event_name,
            source_service: model.source_service,
            stack_hash: model.stack_hash,
        },
        error_message: model.error_message,
        ticket: model.ticket,
        note: model.note,
        created_at: model.created_at,
        modified_at: model.modified_at,
    }
}

// ── Scheduled retry repository ───────────────────────────────────────────────

#[derive(Clone)]
pub struct DbScheduledRetryRepository {
    pub db: DatabaseConnection,
}

impl ScheduledRetryRepository for DbScheduledRetryRepository {
    async fn insert(&self, retry: &ScheduledRetry) -> Result<(), StoreError> {
        retry_active_model(retry)
            .insert(&self.db)
            .await
            .map_err(|e| store_err("insert scheduled retry", e))?;
        Ok(())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ScheduledRetry>, StoreError> {
        let models = scheduled_retries::Entity::find()
            .filter(scheduled_retries::Column::DueAt.lte(now))
            .filter(scheduled_retries::Column::Cancelled.eq(false))
            .filter(scheduled_retries::Column::ClaimedAt.is_null())
            .filter(scheduled_retries::Column::ResolvedAt.is_null())
            .order_by_asc(scheduled_retries::Column::DueAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| store_err("list due retries", e))?;
        Ok(models.into_iter().map(retry_from_model).collect())
    }

    async fn claim(&self, id: Uuid, version: i32, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = scheduled_retries::Entity::update_many()
            .set(scheduled_retries::ActiveModel {
                claimed_at: Set(Some(now)),
                version: Set(version + 1),
                ..Default::default()
            })
            .filter(scheduled_retries::Column::Id.eq(id))
            .filter(scheduled_retries::Column::Version.eq(version))
            .filter(scheduled_retries::Column::Cancelled.eq(false))
            .filter(scheduled_retries::Column::ClaimedAt.is_null())
            .filter(scheduled_retries::Column::ResolvedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| store_err("claim scheduled retry", e))?;
        Ok(result.rows_affected > 0)
    }

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        scheduled_retries::Entity::update_many()
            .set(scheduled_retries::ActiveModel {
                resolved_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(scheduled_retries::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(|e| store_err("resolve scheduled retry", e))?;
        Ok(())
    }

    async fn cancel_for_record(&self, failure_record_id: Uuid) -> Result<u64, StoreError> {
        let result = scheduled_retries::Entity::update_many()
            .set(scheduled_retries::ActiveModel {
                cancelled: Set(true),
                ..Default::default()
            })
            .filter(scheduled_retries::Column::FailureRecordId.eq(failure_record_id))
            .filter(scheduled_retries::Column::Cancelled.eq(false))
            .filter(scheduled_retries::Column::ClaimedAt.is_null())
            .filter(scheduled_retries::Column::ResolvedAt.is_null())
            .exec(&self.db)
            .await
            .map_err(|e| store_err("cancel retries for record", e))?;
        Ok(result.rows_affected)
    }
}

fn retry_active_model(retry: &ScheduledRetry) -> scheduled_retries::ActiveModel {
    scheduled_retries::ActiveModel {
        id: Set(retry.id),
        failure_record_id: Set(retry.failure_record_id),
        due_at: Set(retry.due_at),
        cancelled: Set(retry.cancelled),
        claimed_at: Set(retry.claimed_at),
        resolved_at: Set(retry.resolved_at),
        version: Set(retry.version),
        created_at: Set(retry.created_at),
    }
}

fn retry_from_model(model: scheduled_retries::Model) -> ScheduledRetry {
    ScheduledRetry {
        id: model.id,
        failure_record_id: model.failure_record_id,
        due_at: model.due_at,
        cancelled: model.cancelled,
        claimed_at: model.claimed_at,
        resolved_at: model.resolved_at,
        version: model.version,
        created_at: model.created_at,
    }
}

// ── Audit sink ───────────────────────────────────────────────────────────────

/// Writes the audit trail. Failures are logged and swallowed: an audit
/// hiccup must never roll back the operation it describes.
#[derive(Clone)]
pub struct DbAuditSink {
    pub db: DatabaseConnection,
}

impl DbAuditSink {
    async fn write(&self, record: &FailureRecord, action: AuditAction) -> Result<(), DbErr> {
        audit_entries::ActiveModel {
            id: Set(Uuid::now_v7()),
            failure_record_id: Set(record.id),
            action: Set(action.as_str().to_owned()),
            state_at: Set(record.state.as_str().to_owned()),
            reason: Set(record.closing_reason.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

impl AuditSink for DbAuditSink {
    async fn log_resend(&self, record: &FailureRecord) {
        if let Err(err) = self.write(record, AuditAction::Resend).await {
            warn!(record_id = %record.id, error = %err, "audit write for resend failed");
        }
    }

    async fn log_delete(&self, record: &FailureRecord) {
        if let Err(err) = self.write(record, AuditAction::Delete).await {
            warn!(record_id = %record.id, error = %err, "audit write for delete failed");
        }
    }
}
