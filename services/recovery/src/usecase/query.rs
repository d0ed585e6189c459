use uuid::Uuid;

use busbar_domain::pagination::Page;

use crate::domain::repository::FailureRecordRepository;
use crate::domain::types::{FailureRecord, FailureState};
use crate::error::RecoveryError;

pub struct GetFailureUseCase<R>
where
    R: FailureRecordRepository,
{
    pub records: R,
}

impl<R> GetFailureUseCase<R>
where
    R: FailureRecordRepository,
{
    pub async fn execute(&self, id: Uuid) -> Result<FailureRecord, RecoveryError> {
        self.records
            .find_by_id(id)
            .await?
            .ok_or(RecoveryError::RecordNotFound)
    }
}

/// One page of failures plus the overall count for that state.
#[derive(Debug, Clone)]
pub struct FailurePage {
    pub records: Vec<FailureRecord>,
    pub total: u64,
}

pub struct ListFailuresByStateUseCase<R>
where
    R: FailureRecordRepository,
{
    pub records: R,
}

impl<R> ListFailuresByStateUseCase<R>
where
    R: FailureRecordRepository,
{
    pub async fn execute(
        &self,
        state: FailureState,
        page: Page,
    ) -> Result<FailurePage, RecoveryError> {
        let records = self.records.list_by_state(state, page).await?;
        let total = self.records.count_by_state(state).await?;
        Ok(FailurePage { records, total })
    }
}

/// How many failures a causing message has accumulated so far; the retry
/// policy reads the same number when sizing its backoff.
pub struct CountFailuresForCausingEventUseCase<R>
where
    R: FailureRecordRepository,
{
    pub records: R,
}

impl<R> CountFailuresForCausingEventUseCase<R>
where
    R: FailureRecordRepository,
{
    pub async fn execute(&self, event_id: &str) -> Result<u64, RecoveryError> {
        Ok(self.records.count_for_causing_event(event_id).await?)
    }
}
