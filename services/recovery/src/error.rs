use std::time::Duration;

use busbar_domain::wire::RecordFormat;

use crate::domain::types::FailureState;

// ── Store faults ─────────────────────────────────────────────────────────────

/// Classified database failure.
///
/// Repositories map driver errors onto these variants so callers can tell
/// transient infrastructure trouble from deterministic failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database connection lost")]
    ConnectionLost(#[source] anyhow::Error),
    #[error("statement timed out")]
    QueryTimeout(#[source] anyhow::Error),
    #[error("lock acquisition timed out")]
    LockTimeout(#[source] anyhow::Error),
    #[error("database is read-only")]
    ReadOnly(#[source] anyhow::Error),
    #[error("unique constraint violated: {0}")]
    Unique(String),
    #[error("concurrent modification detected")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Faults a later attempt against the same database may not hit.
    ///
    /// `ReadOnly` counts: it is what a client sees mid-failover, before the
    /// new primary accepts writes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionLost(_)
                | StoreError::QueryTimeout(_)
                | StoreError::LockTimeout(_)
                | StoreError::ReadOnly(_)
        )
    }
}

// ── External collaborator faults ─────────────────────────────────────────────

/// The task system rejected or failed a request.
#[derive(Debug, thiserror::Error)]
#[error("task system request failed")]
pub struct TaskError(#[from] pub anyhow::Error);

/// A bus gateway interaction failed.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus did not acknowledge within {0:?}")]
    Timeout(Duration),
    #[error("bus send failed")]
    Send(#[source] anyhow::Error),
    #[error("bus receive failed")]
    Receive(#[source] anyhow::Error),
}

// ── Service error ────────────────────────────────────────────────────────────

/// Recovery service error variants.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("failure record not found")]
    RecordNotFound,
    #[error("failure group not found")]
    GroupNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("record in state {0} cannot be resent")]
    NotRetryable(FailureState),
    #[error("record in state {0} cannot be deleted")]
    NotDeletable(FailureState),
    #[error("record should be in state {expected} but is {actual}")]
    TaskPrecondition {
        expected: FailureState,
        actual: FailureState,
    },
    #[error("concurrent modification detected")]
    Conflict,
    #[error("payload carries no recognizable wire format")]
    UnresolvableFormat,
    #[error("no configured cluster accepts format {0}")]
    NoSuitableCluster(RecordFormat),
    #[error("bus did not acknowledge within {0:?}")]
    ReplayTimeout(Duration),
    #[error("bus send failed")]
    BusSend(#[source] anyhow::Error),
    #[error(transparent)]
    Store(StoreError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl RecoveryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::GroupNotFound => "GROUP_NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::NotRetryable(_) => "NOT_RETRYABLE",
            Self::NotDeletable(_) => "NOT_DELETABLE",
            Self::TaskPrecondition { .. } => "TASK_PRECONDITION",
            Self::Conflict => "CONFLICT",
            Self::UnresolvableFormat => "UNRESOLVABLE_FORMAT",
            Self::NoSuitableCluster(_) => "NO_SUITABLE_CLUSTER",
            Self::ReplayTimeout(_) => "REPLAY_TIMEOUT",
            Self::BusSend(_) => "BUS_SEND",
            Self::Store(_) => "STORE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Listener-side fault classification.
    ///
    /// True only for transient store faults, wherever they sit in the cause
    /// chain. Everything else, bad payloads included, is final for the
    /// delivery at hand.
    pub fn is_recoverable(&self) -> bool {
        if let Self::Store(store) = self {
            return store.is_transient();
        }
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            if let Some(store) = err.downcast_ref::<StoreError>() {
                return store.is_transient();
            }
            source = err.source();
        }
        false
    }
}

impl From<StoreError> for RecoveryError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost optimistic-lock race is a business-level conflict.
            StoreError::Conflict => RecoveryError::Conflict,
            other => RecoveryError::Store(other),
        }
    }
}

impl From<BusError> for RecoveryError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout(waited) => RecoveryError::ReplayTimeout(waited),
            BusError::Send(source) => RecoveryError::BusSend(source),
            BusError::Receive(source) => {
                RecoveryError::Internal(source.context("bus receive failed"))
            }
        }
    }
}
