use tracing::{info, warn};

use busbar_domain::pagination::Page;

use crate::domain::repository::{FailureRecordRepository, ManualTaskDriver};
use crate::domain::types::FailureState;
use crate::error::RecoveryError;

#[derive(Clone, Copy)]
enum TaskOp {
    Open,
    Close,
    Delete,
}

impl TaskOp {
    fn state(self) -> FailureState {
        match self {
            Self::Open => FailureState::AwaitingManualTask,
            Self::Close => FailureState::AwaitingTaskClose,
            Self::Delete => FailureState::AwaitingTaskDelete,
        }
    }
}

/// Re-drives records parked on the task system.
///
/// A record ends up in one of the awaiting states when the task system
/// was down at transition time; this pass periodically retries the
/// pending operation until it sticks.
pub struct SynchronizeTasksUseCase<R, D>
where
    R: FailureRecordRepository,
    D: ManualTaskDriver,
{
    pub records: R,
    pub driver: D,
    pub chunk_size: u64,
    pub max_chunks: u32,
}

impl<R, D> SynchronizeTasksUseCase<R, D>
where
    R: FailureRecordRepository,
    D: ManualTaskDriver,
{
    /// Returns how many records left their awaiting state.
    pub async fn execute(&self) -> Result<u64, RecoveryError> {
        let mut moved = 0u64;
        for op in [TaskOp::Open, TaskOp::Close, TaskOp::Delete] {
            moved += self.drive(op).await?;
        }
        if moved > 0 {
            info!(moved, "task synchronization pass finished");
        }
        Ok(moved)
    }

    async fn drive(&self, op: TaskOp) -> Result<u64, RecoveryError> {
        let state = op.state();
        let page = Page::new(1, self.chunk_size);
        let mut moved = 0u64;
        for _ in 0..self.max_chunks {
            // Always the first page: records that move leave the state,
            // and stalled ones would only be re-read further back.
            let batch = self.records.list_by_state(state, page).await?;
            if batch.is_empty() {
                break;
            }
            let full_chunk = batch.len() as u64 == page.limit();
            let mut progressed = 0u64;
            for mut record in batch {
                let result = match op {
                    TaskOp::Open => self.driver.open_manual_task(&mut record).await,
                    TaskOp::Close => self.driver.close_manual_task(&mut record).await,
                    TaskOp::Delete => self.driver.delete_manual_task(&mut record).await,
                };
                match result {
                    Ok(()) if record.state != state => progressed += 1,
                    // Task system still down; the record stays parked.
                    Ok(()) => {}
                    Err(err) => {
                        warn!(
                            record_id = %record.id,
                            state = %state,
                            error = %err,
                            "task synchronization failed for record"
                        );
                    }
                }
            }
            moved += progressed;
            if progressed == 0 || !full_chunk {
                break;
            }
        }
        Ok(moved)
    }
}
