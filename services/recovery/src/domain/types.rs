use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use busbar_domain::report::Header;
use busbar_domain::temporality::Temporality;
use busbar_domain::trace::TraceContext;
use busbar_domain::wire::RecordFormat;

use crate::error::RecoveryError;

// ── Failure lifecycle state ──────────────────────────────────────────────────

/// Lifecycle state of a [`FailureRecord`].
///
/// `RetriedAfterTemporary`, `RetriedAfterPermanent` and `Closed` are final.
/// The three `Awaiting*` states are parked on an external system: the task
/// synchronizer re-drives them until the task system cooperates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    RetryPending,
    AwaitingManualTask,
    OpenManualTask,
    RetriedAfterTemporary,
    AwaitingTaskClose,
    RetriedAfterPermanent,
    AwaitingTaskDelete,
    Closed,
}

impl FailureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureState::RetryPending => "RETRY_PENDING",
            FailureState::AwaitingManualTask => "AWAITING_MANUAL_TASK",
            FailureState::OpenManualTask => "OPEN_MANUAL_TASK",
            FailureState::RetriedAfterTemporary => "RETRIED_AFTER_TEMPORARY",
            FailureState::AwaitingTaskClose => "AWAITING_TASK_CLOSE",
            FailureState::RetriedAfterPermanent => "RETRIED_AFTER_PERMANENT",
            FailureState::AwaitingTaskDelete => "AWAITING_TASK_DELETE",
            FailureState::Closed => "CLOSED",
        }
    }

    /// Display-layer hint carried for admin clients.
    ///
    /// The state machine itself gates operations on explicit state checks;
    /// note that this flag disagrees with those checks on
    /// `AwaitingTaskDelete` and `Closed`, which is historical behavior.
    pub fn retry_allowed(&self) -> bool {
        matches!(
            self,
            FailureState::RetryPending
                | FailureState::AwaitingManualTask
                | FailureState::OpenManualTask
                | FailureState::AwaitingTaskDelete
                | FailureState::Closed
        )
    }

    /// Display-layer hint carried for admin clients (see [`Self::retry_allowed`]).
    pub fn delete_allowed(&self) -> bool {
        matches!(
            self,
            FailureState::RetryPending
                | FailureState::AwaitingManualTask
                | FailureState::OpenManualTask
        )
    }
}

impl fmt::Display for FailureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown failure state: {0:?}")]
pub struct ParseStateError(String);

impl FromStr for FailureState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RETRY_PENDING" => Ok(FailureState::RetryPending),
            "AWAITING_MANUAL_TASK" => Ok(FailureState::AwaitingManualTask),
            "OPEN_MANUAL_TASK" => Ok(FailureState::OpenManualTask),
            "RETRIED_AFTER_TEMPORARY" => Ok(FailureState::RetriedAfterTemporary),
            "AWAITING_TASK_CLOSE" => Ok(FailureState::AwaitingTaskClose),
            "RETRIED_AFTER_PERMANENT" => Ok(FailureState::RetriedAfterPermanent),
            "AWAITING_TASK_DELETE" => Ok(FailureState::AwaitingTaskDelete),
            "CLOSED" => Ok(FailureState::Closed),
            other => Err(ParseStateError(other.to_owned())),
        }
    }
}

// ── Failure record ───────────────────────────────────────────────────────────

/// One recorded processing failure and everything needed to recover it.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub id: Uuid,
    pub state: FailureState,
    pub temporality: Temporality,
    pub error_code: String,
    pub error_message: String,
    pub error_description: Option<String>,
    pub stack_trace: Option<String>,
    pub stack_hash: Option<String>,
    /// Row id of the stored [`CausingEvent`].
    pub causing_event_id: Uuid,
    pub group_id: Option<Uuid>,
    pub reporter_service: String,
    pub reporter_system: Option<String>,
    pub report_event_id: String,
    pub report_type_name: String,
    pub report_type_version: Option<String>,
    pub report_idempotence_id: String,
    pub report_created: Option<DateTime<Utc>>,
    pub closing_reason: Option<String>,
    pub task_id: Option<Uuid>,
    pub trace: Option<TraceContext>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    /// A fresh record for the next retry attempt of the same causing event.
    ///
    /// Failed scheduled resends chain across records instead of mutating one
    /// row forever, so each attempt keeps its own history. The clone starts
    /// over: new id, `RetryPending`, no group, no task, version zero.
    pub fn clone_for_retry(&self, now: DateTime<Utc>) -> FailureRecord {
        FailureRecord {
            id: Uuid::now_v7(),
            state: FailureState::RetryPending,
            group_id: None,
            task_id: None,
            closing_reason: None,
            version: 0,
            created_at: now,
            modified_at: None,
            ..self.clone()
        }
    }
}

// ── Causing event ────────────────────────────────────────────────────────────

/// The original bus message a consumer failed to process, byte-exact.
#[derive(Debug, Clone)]
pub struct CausingEvent {
    pub id: Uuid,
    pub event_id: Option<String>,
    pub event_idempotence_id: Option<String>,
    pub event_name: String,
    pub event_version: Option<String>,
    pub publisher_service: String,
    pub publisher_system: Option<String>,
    pub event_created: Option<DateTime<Utc>>,
    pub topic: String,
    pub cluster: Option<String>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<Header>,
    pub created_at: DateTime<Utc>,
}

// ── Failure group ────────────────────────────────────────────────────────────

/// Identity of a failure group: the same signature means "the same failure
/// happening again".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub error_code: String,
    pub event_name: String,
    pub source_service: String,
    pub stack_hash: String,
}

/// Dedup bucket for recurring identical failures.
#[derive(Debug, Clone)]
pub struct FailureGroup {
    pub id: Uuid,
    pub key: GroupKey,
    /// Message of the failure that opened the group.
    pub error_message: String,
    pub ticket: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

// ── Scheduled retry ──────────────────────────────────────────────────────────

/// A durable "resend this record's causing event at T" job.
#[derive(Debug, Clone)]
pub struct ScheduledRetry {
    pub id: Uuid,
    pub failure_record_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub cancelled: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl ScheduledRetry {
    pub fn new(failure_record_id: Uuid, due_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            failure_record_id,
            due_at,
            cancelled: false,
            claimed_at: None,
            resolved_at: None,
            version: 0,
            created_at: now,
        }
    }

    /// A job still waiting for the scheduler.
    pub fn is_active(&self) -> bool {
        !self.cancelled && self.resolved_at.is_none()
    }
}

// ── Audit trail ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Resend,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Resend => "RESEND",
            AuditAction::Delete => "DELETE",
        }
    }
}

/// Audit row written for manual resends and deletes.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub failure_record_id: Uuid,
    pub action: AuditAction,
    pub state_at: FailureState,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── External collaborator payloads ───────────────────────────────────────────

/// What the task system needs to open a manual task.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub failure_record_id: Uuid,
    pub title: String,
    pub details: String,
}

/// A record ready to be put back on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub cluster: String,
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<Header>,
    /// Trace of the original processing attempt; `None` leaves propagation
    /// to the transport's ambient context.
    pub trace: Option<TraceContext>,
}

/// A raw consumed message as handed to the listener.
#[derive(Debug, Clone)]
pub struct IncomingEnvelope {
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Vec<Header>,
}

// ── Cluster topology ─────────────────────────────────────────────────────────

/// One configured bus cluster and the wire framing its registry uses.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub format: RecordFormat,
}

/// The configured clusters, in configuration order.
///
/// Replay routing picks a destination here: the message's origin cluster
/// wins while its configuration still matches the payload's framing, and
/// a re-homed registry falls back to the first cluster speaking the
/// sniffed format.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    clusters: Vec<ClusterConfig>,
    default_cluster: Option<String>,
}

impl ClusterTopology {
    pub fn new(clusters: Vec<ClusterConfig>, default_cluster: Option<String>) -> Self {
        Self {
            clusters,
            default_cluster,
        }
    }

    pub fn clusters(&self) -> &[ClusterConfig] {
        &self.clusters
    }

    fn contains(&self, name: &str) -> bool {
        self.clusters.iter().any(|c| c.name == name)
    }

    fn format_of(&self, name: &str) -> Option<RecordFormat> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.format)
    }

    fn first_with_format(&self, format: RecordFormat) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.format == format)
    }

    /// Pick the cluster a stored payload should be replayed on.
    ///
    /// `origin` is the cluster the message was originally consumed from,
    /// if the report recorded one.
    pub fn select(&self, origin: Option<&str>, payload: &[u8]) -> Result<String, RecoveryError> {
        let origin = origin.or(self.default_cluster.as_deref());
        match (RecordFormat::sniff(payload), origin) {
            // Origin still configured and its framing matches the payload.
            (Some(format), Some(name)) if self.format_of(name) == Some(format) => {
                Ok(name.to_owned())
            }
            // Framing indeterminate; trust the origin while it exists.
            (None, Some(name)) if self.contains(name) => Ok(name.to_owned()),
            (None, _) => Err(RecoveryError::UnresolvableFormat),
            // Origin gone or re-registered under another framing; any
            // cluster speaking the sniffed format can serve the replay.
            (Some(format), _) => self
                .first_with_format(format)
                .map(|c| c.name.clone())
                .ok_or(RecoveryError::NoSuitableCluster(format)),
        }
    }
}
