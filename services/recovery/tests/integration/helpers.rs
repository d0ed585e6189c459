use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use busbar_domain::pagination::Page;
use busbar_domain::report::EventMetadata;
use busbar_domain::temporality::Temporality;
use busbar_domain::wire::RecordFormat;
use busbar_recovery::domain::repository::{
    AuditSink, BusSender, CausingEventRepository, FailureGroupRepository, FailureRecordRepository,
    PayloadProbe, ScheduledRetryRepository, TaskClient,
};
use busbar_recovery::domain::types::{
    CausingEvent, ClusterConfig, ClusterTopology, FailureGroup, FailureRecord, FailureState,
    GroupKey, OutboundRecord, ScheduledRetry, TaskDescriptor,
};
use busbar_recovery::error::{BusError, StoreError, TaskError};
use busbar_recovery::infra::task::DefaultTaskFactory;
use busbar_recovery::usecase::failure::FailureLifecycle;
use busbar_recovery::usecase::group::GroupDeduplicator;
use busbar_recovery::usecase::ingest::IngestFailureUseCase;
use busbar_recovery::usecase::replay::EventReplayer;
use busbar_recovery::usecase::retry::ExponentialBackoffPolicy;
use busbar_testing::payload::confluent;

// ── MockRecordRepo ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockRecordRepo {
    pub records: Arc<Mutex<Vec<FailureRecord>>>,
    pub events: Arc<Mutex<Vec<CausingEvent>>>,
    pub retries: Arc<Mutex<Vec<ScheduledRetry>>>,
}

impl FailureRecordRepository for MockRecordRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn exists_for_report(
        &self,
        idempotence_id: &str,
        reporter_service: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.records.lock().unwrap().iter().any(|r| {
            r.report_idempotence_id == idempotence_id && r.reporter_service == reporter_service
        }))
    }

    async fn insert(&self, record: &FailureRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn insert_with_retry(
        &self,
        record: &FailureRecord,
        retry: &ScheduledRetry,
    ) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        self.retries.lock().unwrap().push(retry.clone());
        Ok(())
    }

    async fn update(&self, record: &mut FailureRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let Some(stored) = records.iter_mut().find(|r| r.id == record.id) else {
            return Err(StoreError::Conflict);
        };
        if stored.version != record.version {
            return Err(StoreError::Conflict);
        }
        record.version += 1;
        record.modified_at = Some(Utc::now());
        *stored = record.clone();
        Ok(())
    }

    async fn count_for_causing_event(&self, event_id: &str) -> Result<u64, StoreError> {
        let event_ids: Vec<Uuid> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_id.as_deref() == Some(event_id))
            .map(|e| e.id)
            .collect();
        let count = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| event_ids.contains(&r.causing_event_id))
            .count();
        Ok(count as u64)
    }

    async fn list_by_state(
        &self,
        state: FailureState,
        page: Page,
    ) -> Result<Vec<FailureRecord>, StoreError> {
        let mut matching: Vec<FailureRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn count_by_state(&self, state: FailureState) -> Result<u64, StoreError> {
        let count = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.state == state)
            .count();
        Ok(count as u64)
    }
}

// ── MockEventRepo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockEventRepo {
    pub events: Arc<Mutex<Vec<CausingEvent>>>,
}

impl CausingEventRepository for MockEventRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CausingEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<CausingEvent>, StoreError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn insert(&self, event: &CausingEvent) -> Result<(), StoreError> {
        let mut events = self.events.lock().unwrap();
        if let Some(event_id) = event.event_id.as_deref() {
            if events.iter().any(|e| e.event_id.as_deref() == Some(event_id)) {
                return Err(StoreError::Unique("causing event id".to_owned()));
            }
        }
        events.push(event.clone());
        Ok(())
    }

    async fn update(&self, event: &CausingEvent) -> Result<(), StoreError> {
        let mut events = self.events.lock().unwrap();
        if let Some(stored) = events.iter_mut().find(|e| e.id == event.id) {
            *stored = event.clone();
        }
        Ok(())
    }
}

// ── MockRetryRepo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockRetryRepo {
    pub retries: Arc<Mutex<Vec<ScheduledRetry>>>,
}

impl ScheduledRetryRepository for MockRetryRepo {
    async fn insert(&self, retry: &ScheduledRetry) -> Result<(), StoreError> {
        self.retries.lock().unwrap().push(retry.clone());
        Ok(())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<ScheduledRetry>, StoreError> {
        let mut due: Vec<ScheduledRetry> = self
            .retries
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active() && r.claimed_at.is_none() && r.due_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claim(&self, id: Uuid, version: i32, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut retries = self.retries.lock().unwrap();
        let Some(stored) = retries.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if stored.version != version || !stored.is_active() || stored.claimed_at.is_some() {
            return Ok(false);
        }
        stored.claimed_at = Some(now);
        stored.version += 1;
        Ok(true)
    }

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut retries = self.retries.lock().unwrap();
        if let Some(stored) = retries.iter_mut().find(|r| r.id == id) {
            stored.resolved_at = Some(now);
        }
        Ok(())
    }

    async fn cancel_for_record(&self, failure_record_id: Uuid) -> Result<u64, StoreError> {
        let mut cancelled = 0u64;
        let mut retries = self.retries.lock().unwrap();
        for retry in retries.iter_mut() {
            if retry.failure_record_id == failure_record_id
                && retry.is_active()
                && retry.claimed_at.is_none()
            {
                retry.cancelled = true;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

// ── MockGroupRepo ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockGroupRepo {
    pub groups: Arc<Mutex<Vec<FailureGroup>>>,
}

impl FailureGroupRepository for MockGroupRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FailureGroup>, StoreError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .cloned())
    }

    async fn find_by_key(&self, key: &GroupKey) -> Result<Option<FailureGroup>, StoreError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.key == *key)
            .cloned())
    }

    async fn insert(&self, group: &FailureGroup) -> Result<(), StoreError> {
        let mut groups = self.groups.lock().unwrap();
        if groups.iter().any(|g| g.key == group.key) {
            return Err(StoreError::Unique("failure group signature".to_owned()));
        }
        groups.push(group.clone());
        Ok(())
    }

    async fn update_ticket(&self, id: Uuid, ticket: Option<&str>) -> Result<bool, StoreError> {
        let mut groups = self.groups.lock().unwrap();
        if let Some(ticket) = ticket {
            if groups.iter().any(|g| g.id != id && g.ticket.as_deref() == Some(ticket)) {
                return Err(StoreError::Unique("group ticket".to_owned()));
            }
        }
        let Some(stored) = groups.iter_mut().find(|g| g.id == id) else {
            return Ok(false);
        };
        stored.ticket = ticket.map(str::to_owned);
        stored.modified_at = Some(Utc::now());
        Ok(true)
    }

    async fn update_note(&self, id: Uuid, note: Option<&str>) -> Result<bool, StoreError> {
        let mut groups = self.groups.lock().unwrap();
        let Some(stored) = groups.iter_mut().find(|g| g.id == id) else {
            return Ok(false);
        };
        stored.note = note.map(str::to_owned);
        stored.modified_at = Some(Utc::now());
        Ok(true)
    }
}

// ── MockAuditSink ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditCall {
    pub action: &'static str,
    pub record_id: Uuid,
    pub state: FailureState,
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct MockAuditSink {
    pub entries: Arc<Mutex<Vec<AuditCall>>>,
}

impl AuditSink for MockAuditSink {
    async fn log_resend(&self, record: &FailureRecord) {
        self.entries.lock().unwrap().push(AuditCall {
            action: "RESEND",
            record_id: record.id,
            state: record.state,
            reason: record.closing_reason.clone(),
        });
    }

    async fn log_delete(&self, record: &FailureRecord) {
        self.entries.lock().unwrap().push(AuditCall {
            action: "DELETE",
            record_id: record.id,
            state: record.state,
            reason: record.closing_reason.clone(),
        });
    }
}

// ── MockTaskClient ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockTaskClient {
    pub created: Arc<Mutex<Vec<TaskDescriptor>>>,
    pub closed: Arc<Mutex<Vec<Uuid>>>,
    pub down: Arc<AtomicBool>,
}

impl TaskClient for MockTaskClient {
    async fn create_task(&self, descriptor: &TaskDescriptor) -> Result<Uuid, TaskError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TaskError(anyhow::anyhow!("task system down")));
        }
        self.created.lock().unwrap().push(descriptor.clone());
        Ok(Uuid::now_v7())
    }

    async fn close_task(&self, task_id: Uuid) -> Result<(), TaskError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TaskError(anyhow::anyhow!("task system down")));
        }
        self.closed.lock().unwrap().push(task_id);
        Ok(())
    }
}

// ── MockBus ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockBus {
    pub sent: Arc<Mutex<Vec<OutboundRecord>>>,
    pub down: Arc<AtomicBool>,
}

impl BusSender for MockBus {
    async fn send(&self, record: &OutboundRecord) -> Result<(), BusError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::Send(anyhow::anyhow!("bus gateway down")));
        }
        self.sent.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ── NoProbe ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct NoProbe;

impl PayloadProbe for NoProbe {
    fn probe_metadata(&self, _cluster: Option<&str>, _payload: &[u8]) -> Option<EventMetadata> {
        None
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub type TestLifecycle = FailureLifecycle<
    MockRecordRepo,
    MockEventRepo,
    MockRetryRepo,
    MockGroupRepo,
    MockTaskClient,
    DefaultTaskFactory,
    ExponentialBackoffPolicy,
    MockAuditSink,
    MockBus,
>;

pub type TestIngest = IngestFailureUseCase<
    MockRecordRepo,
    MockEventRepo,
    MockRetryRepo,
    MockGroupRepo,
    MockTaskClient,
    DefaultTaskFactory,
    ExponentialBackoffPolicy,
    MockAuditSink,
    MockBus,
    NoProbe,
>;

/// Fully wired lifecycle over in-memory stores, with handles for
/// post-execution inspection and switches for collaborator outages.
pub struct Harness {
    pub records: Arc<Mutex<Vec<FailureRecord>>>,
    pub events: Arc<Mutex<Vec<CausingEvent>>>,
    pub retries: Arc<Mutex<Vec<ScheduledRetry>>>,
    pub groups: Arc<Mutex<Vec<FailureGroup>>>,
    pub audits: Arc<Mutex<Vec<AuditCall>>>,
    pub created_tasks: Arc<Mutex<Vec<TaskDescriptor>>>,
    pub closed_tasks: Arc<Mutex<Vec<Uuid>>>,
    pub task_system_down: Arc<AtomicBool>,
    pub bus_sent: Arc<Mutex<Vec<OutboundRecord>>>,
    pub bus_down: Arc<AtomicBool>,
    pub lifecycle: TestLifecycle,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(ExponentialBackoffPolicy::default())
    }

    pub fn with_policy(policy: ExponentialBackoffPolicy) -> Self {
        let records = Arc::new(Mutex::new(vec![]));
        let events = Arc::new(Mutex::new(vec![]));
        let retries = Arc::new(Mutex::new(vec![]));
        let groups = Arc::new(Mutex::new(vec![]));
        let audits = Arc::new(Mutex::new(vec![]));
        let created_tasks = Arc::new(Mutex::new(vec![]));
        let closed_tasks = Arc::new(Mutex::new(vec![]));
        let task_system_down = Arc::new(AtomicBool::new(false));
        let bus_sent = Arc::new(Mutex::new(vec![]));
        let bus_down = Arc::new(AtomicBool::new(false));

        let lifecycle = FailureLifecycle {
            records: MockRecordRepo {
                records: Arc::clone(&records),
                events: Arc::clone(&events),
                retries: Arc::clone(&retries),
            },
            events: MockEventRepo {
                events: Arc::clone(&events),
            },
            retries: MockRetryRepo {
                retries: Arc::clone(&retries),
            },
            groups: GroupDeduplicator {
                groups: MockGroupRepo {
                    groups: Arc::clone(&groups),
                },
                enabled: true,
            },
            tasks: MockTaskClient {
                created: Arc::clone(&created_tasks),
                closed: Arc::clone(&closed_tasks),
                down: Arc::clone(&task_system_down),
            },
            task_factory: DefaultTaskFactory {
                service_name: "recovery".to_owned(),
            },
            policy,
            audit: MockAuditSink {
                entries: Arc::clone(&audits),
            },
            replayer: EventReplayer {
                bus: MockBus {
                    sent: Arc::clone(&bus_sent),
                    down: Arc::clone(&bus_down),
                },
                topology: ClusterTopology::new(
                    vec![
                        ClusterConfig {
                            name: "main".to_owned(),
                            format: RecordFormat::Confluent,
                        },
                        ClusterConfig {
                            name: "legacy".to_owned(),
                            format: RecordFormat::Glue,
                        },
                    ],
                    Some("main".to_owned()),
                ),
                service_name: "recovery".to_owned(),
                ack_timeout: Duration::from_secs(5),
            },
        };

        Self {
            records,
            events,
            retries,
            groups,
            audits,
            created_tasks,
            closed_tasks,
            task_system_down,
            bus_sent,
            bus_down,
            lifecycle,
        }
    }

    pub fn ingest(&self) -> TestIngest {
        IngestFailureUseCase {
            records: self.lifecycle.records.clone(),
            events: self.lifecycle.events.clone(),
            probe: NoProbe,
            lifecycle: self.lifecycle.clone(),
        }
    }

    pub fn seed_event(&self, event: CausingEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn seed_record(&self, record: FailureRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn seed_retry(&self, retry: ScheduledRetry) {
        self.retries.lock().unwrap().push(retry);
    }

    /// The stored copy of a record, by id.
    pub fn record(&self, id: Uuid) -> FailureRecord {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .expect("record not stored")
    }

    /// The single stored record; panics when there is more or less than one.
    pub fn only_record(&self) -> FailureRecord {
        let records = self.records.lock().unwrap();
        assert_eq!(records.len(), 1, "expected exactly one stored record");
        records[0].clone()
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// A stored causing event on the "main" confluent cluster.
pub fn stored_event() -> CausingEvent {
    CausingEvent {
        id: Uuid::now_v7(),
        event_id: Some("evt-1".to_owned()),
        event_idempotence_id: None,
        event_name: "order-placed".to_owned(),
        event_version: None,
        publisher_service: "ordering".to_owned(),
        publisher_system: None,
        event_created: None,
        topic: "order-events".to_owned(),
        cluster: Some("main".to_owned()),
        partition: Some(0),
        offset: Some(17),
        key: Some(b"order-1".to_vec()),
        payload: confluent(7, br#"{"order":1}"#),
        headers: vec![],
        created_at: Utc::now(),
    }
}

/// A stored failure record pointing at `causing_event_id`.
pub fn stored_record(causing_event_id: Uuid, state: FailureState) -> FailureRecord {
    let now = Utc::now();
    FailureRecord {
        id: Uuid::now_v7(),
        state,
        temporality: match state {
            FailureState::RetryPending | FailureState::RetriedAfterTemporary => {
                Temporality::Temporary
            }
            _ => Temporality::Permanent,
        },
        error_code: "DB_DOWN".to_owned(),
        error_message: "connection refused".to_owned(),
        error_description: None,
        stack_trace: Some("at billing.Invoice.post".to_owned()),
        stack_hash: Some("a".repeat(64)),
        causing_event_id,
        group_id: None,
        reporter_service: "billing".to_owned(),
        reporter_system: None,
        report_event_id: format!("rep-{}", Uuid::now_v7()),
        report_type_name: "message-processing-failed".to_owned(),
        report_type_version: None,
        report_idempotence_id: format!("idem-{}", Uuid::now_v7()),
        report_created: None,
        closing_reason: None,
        task_id: None,
        trace: None,
        version: 0,
        created_at: now,
        modified_at: None,
    }
}
