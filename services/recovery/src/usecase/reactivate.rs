use tracing::info;

use crate::domain::repository::{BusSender, ReportSource};
use crate::domain::types::OutboundRecord;
use crate::error::RecoveryError;

/// Moves dead-lettered failure reports back onto the report topic.
///
/// Reports end up on the dead-letter topic when they could not be decoded
/// or hit a non-recoverable fault during ingestion. After a fix is
/// deployed an operator drains them back for another pass. Each message is
/// acknowledged only once its republish went through, so a crash mid-drain
/// loses nothing.
pub struct ReactivateDeadLettersUseCase<Src, B>
where
    Src: ReportSource,
    B: BusSender,
{
    pub dead_letters: Src,
    pub bus: B,
    pub report_topic: String,
    pub report_cluster: String,
}

impl<Src, B> ReactivateDeadLettersUseCase<Src, B>
where
    Src: ReportSource,
    B: BusSender,
{
    /// Drain up to `max_records` messages; returns how many moved.
    pub async fn execute(&mut self, max_records: u64) -> Result<u64, RecoveryError> {
        let mut moved = 0u64;
        while moved < max_records {
            let Some(envelope) = self.dead_letters.next().await? else {
                break;
            };
            let outbound = OutboundRecord {
                cluster: self.report_cluster.clone(),
                topic: self.report_topic.clone(),
                key: envelope.key,
                payload: envelope.payload,
                headers: envelope.headers,
                trace: None,
            };
            self.bus.send(&outbound).await?;
            self.dead_letters.ack().await?;
            moved += 1;
        }
        info!(moved, "reactivated dead-lettered reports");
        Ok(moved)
    }
}
