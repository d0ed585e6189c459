use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::repository::{ResendExecutor, RetryPolicy, ScheduledRetryRepository};
use crate::domain::types::{CausingEvent, FailureRecord};
use crate::error::RecoveryError;

// ── Backoff policy ───────────────────────────────────────────────────────────

/// Exponential backoff over the number of failures already recorded for
/// the same causing message.
///
/// The first attempt waits `initial_delay`, each further one multiplies
/// by `multiplier` up to `max_delay`. Once `max_attempts` failures exist
/// the policy gives up and the failure goes to a human instead.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_delay: Duration::from_secs(24 * 60 * 60),
            max_attempts: 15,
        }
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn next_attempt(
        &self,
        prior_failures: u64,
        _record: &FailureRecord,
        _event: &CausingEvent,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if prior_failures >= u64::from(self.max_attempts) {
            return None;
        }
        let exponent = i32::try_from(prior_failures).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let delay = self
            .initial_delay
            .mul_f64(factor.max(1.0))
            .min(self.max_delay);
        Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64))
    }
}

// ── Due-retry runner ─────────────────────────────────────────────────────────

/// Drains due retry jobs in batches and hands each to the executor.
///
/// Claiming is optimistic: several instances poll the same table, and the
/// conditional claim makes sure exactly one of them runs a given job.
pub struct RunDueRetriesUseCase<S, X>
where
    S: ScheduledRetryRepository,
    X: ResendExecutor,
{
    pub retries: S,
    pub executor: X,
    pub batch_size: u64,
    pub max_batches: u32,
}

impl<S, X> RunDueRetriesUseCase<S, X>
where
    S: ScheduledRetryRepository,
    X: ResendExecutor,
{
    /// Returns the number of jobs this instance claimed and ran.
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<u64, RecoveryError> {
        let mut processed = 0u64;
        for _ in 0..self.max_batches {
            let due = self.retries.due(now, self.batch_size).await?;
            if due.is_empty() {
                break;
            }
            let full_batch = due.len() as u64 == self.batch_size;
            for job in due {
                if !self.retries.claim(job.id, job.version, now).await? {
                    // Another instance got there first.
                    continue;
                }
                if let Err(err) = self.executor.scheduled_resend(&job).await {
                    warn!(
                        job_id = %job.id,
                        record_id = %job.failure_record_id,
                        error = %err,
                        "scheduled resend failed"
                    );
                }
                processed += 1;
            }
            if !full_batch {
                break;
            }
        }
        if processed > 0 {
            info!(processed, "ran due retries");
        }
        Ok(processed)
    }
}
