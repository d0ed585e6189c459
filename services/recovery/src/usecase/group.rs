use chrono::Utc;
use uuid::Uuid;

use crate::domain::repository::FailureGroupRepository;
use crate::domain::types::{CausingEvent, FailureGroup, FailureRecord, GroupKey};
use crate::error::{RecoveryError, StoreError};

// ── Group assignment ─────────────────────────────────────────────────────────

/// Buckets permanently classified failures by their signature.
///
/// The signature is (error code, event name, reporting service, stack hash);
/// two failures sharing all four almost certainly share a root cause, so
/// they land in one group and one ticket covers them.
#[derive(Clone)]
pub struct GroupDeduplicator<G>
where
    G: FailureGroupRepository,
{
    pub groups: G,
    pub enabled: bool,
}

impl<G> GroupDeduplicator<G>
where
    G: FailureGroupRepository,
{
    /// Find or create the group for a record, racing ingestion peers.
    ///
    /// Records without a stack hash carry too weak a signature to bucket;
    /// they stay ungrouped. With grouping disabled this is a no-op.
    pub async fn assign(
        &self,
        record: &FailureRecord,
        event: &CausingEvent,
    ) -> Result<Option<Uuid>, StoreError> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(stack_hash) = record.stack_hash.clone() else {
            return Ok(None);
        };
        let key = GroupKey {
            error_code: record.error_code.clone(),
            event_name: event.event_name.clone(),
            source_service: record.reporter_service.clone(),
            stack_hash,
        };
        if let Some(existing) = self.groups.find_by_key(&key).await? {
            return Ok(Some(existing.id));
        }
        let group = FailureGroup {
            id: Uuid::now_v7(),
            key: key.clone(),
            error_message: record.error_message.clone(),
            ticket: None,
            note: None,
            created_at: Utc::now(),
            modified_at: None,
        };
        match self.groups.insert(&group).await {
            Ok(()) => Ok(Some(group.id)),
            // A concurrent inserter won the signature; use the surviving row.
            Err(StoreError::Unique(_)) => {
                let existing = self.groups.find_by_key(&key).await?.ok_or_else(|| {
                    StoreError::Other(anyhow::anyhow!(
                        "failure group for {key:?} vanished after unique violation"
                    ))
                })?;
                Ok(Some(existing.id))
            }
            Err(err) => Err(err),
        }
    }
}

// ── Group administration ─────────────────────────────────────────────────────

/// Attach, replace or clear the issue-tracker ticket of a group.
pub struct UpdateGroupTicketUseCase<G>
where
    G: FailureGroupRepository,
{
    pub groups: G,
}

impl<G> UpdateGroupTicketUseCase<G>
where
    G: FailureGroupRepository,
{
    /// A blank or empty ticket clears the association.
    pub async fn execute(&self, group_id: Uuid, ticket: Option<&str>) -> Result<(), RecoveryError> {
        let ticket = ticket.map(str::trim).filter(|t| !t.is_empty());
        match self.groups.update_ticket(group_id, ticket).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RecoveryError::GroupNotFound),
            Err(StoreError::Unique(_)) => Err(RecoveryError::Validation(
                "ticket is already assigned to another group".to_owned(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Replace the free-text note of a group.
pub struct UpdateGroupNoteUseCase<G>
where
    G: FailureGroupRepository,
{
    pub groups: G,
}

impl<G> UpdateGroupNoteUseCase<G>
where
    G: FailureGroupRepository,
{
    pub async fn execute(&self, group_id: Uuid, note: Option<&str>) -> Result<(), RecoveryError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if self.groups.update_note(group_id, note).await? {
            Ok(())
        } else {
            Err(RecoveryError::GroupNotFound)
        }
    }
}
