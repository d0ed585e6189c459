use std::time::Duration;

use chrono::Utc;
use rand::RngExt;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::domain::repository::{
    FailureRecordRepository, ManualTaskDriver, ResendExecutor, ScheduledRetryRepository,
};
use crate::usecase::retry::RunDueRetriesUseCase;
use crate::usecase::sync::SynchronizeTasksUseCase;

/// Sleep a random fraction of the interval so replicas spread their polls.
async fn stagger(interval: Duration) {
    let window = (interval.as_millis() as u64 / 10).max(1);
    let jitter = rand::rng().random_range(0..window);
    tokio::time::sleep(Duration::from_millis(jitter)).await;
}

/// Periodically drain due retry jobs. Runs until the process exits.
pub async fn run_retry_poller<S, X>(usecase: RunDueRetriesUseCase<S, X>, interval: Duration)
where
    S: ScheduledRetryRepository,
    X: ResendExecutor,
{
    stagger(interval).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = usecase.execute(Utc::now()).await {
            warn!(error = %err, "retry poll failed");
        }
    }
}

/// Periodically re-drive records parked on the task system.
pub async fn run_task_synchronizer<R, D>(usecase: SynchronizeTasksUseCase<R, D>, interval: Duration)
where
    R: FailureRecordRepository,
    D: ManualTaskDriver,
{
    stagger(interval).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = usecase.execute().await {
            warn!(error = %err, "task synchronization failed");
        }
    }
}
