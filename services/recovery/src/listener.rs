use std::time::Duration;

use tracing::{error, info, warn};

use busbar_domain::report::FailureReport;
use busbar_domain::wire::RecordFormat;

use crate::domain::repository::{BusSender, ReportHandler, ReportSource};
use crate::domain::types::{IncomingEnvelope, OutboundRecord};

/// Pause between polls when the report topic is empty.
const IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Consumes failure reports and drives each through ingestion.
///
/// Fault handling is asymmetric on purpose. A report that cannot be
/// decoded, or that hits a non-recoverable fault, goes to the dead-letter
/// topic and is acknowledged; losing it would hide a failure forever, and
/// blocking on it would starve the topic. A recoverable fault (store
/// connectivity, timeouts) blocks right here: the report is retried
/// without limit and never acknowledged until it lands, because ingestion
/// downstream of a dead store would lose every report in between.
pub struct ReportListener<Src, H, B>
where
    Src: ReportSource,
    H: ReportHandler,
    B: BusSender,
{
    pub source: Src,
    pub handler: H,
    pub dead_letters: B,
    pub dead_letter_topic: String,
    pub dead_letter_cluster: String,
    pub retry_interval: Duration,
}

impl<Src, H, B> ReportListener<Src, H, B>
where
    Src: ReportSource,
    H: ReportHandler,
    B: BusSender,
{
    pub async fn run(mut self) {
        info!("report listener started");
        loop {
            match self.source.next().await {
                Ok(Some(envelope)) => self.process(envelope).await,
                Ok(None) => tokio::time::sleep(IDLE_BACKOFF).await,
                Err(err) => {
                    error!(error = %err, "report source failed");
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// Handle one consumed envelope to completion.
    pub async fn process(&mut self, envelope: IncomingEnvelope) {
        let report = match decode_report(&envelope.payload) {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    topic = %envelope.topic,
                    partition = ?envelope.partition,
                    offset = ?envelope.offset,
                    error = %err,
                    "undecodable failure report, dead-lettering"
                );
                if self.dead_letter(&envelope).await {
                    self.ack().await;
                }
                return;
            }
        };
        loop {
            match self.handler.handle(report.clone()).await {
                Ok(()) => {
                    self.ack().await;
                    return;
                }
                Err(err) if err.is_recoverable() => {
                    warn!(
                        error = %err,
                        kind = err.kind(),
                        "recoverable fault while ingesting report, holding the topic"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(err) => {
                    error!(
                        error = %err,
                        kind = err.kind(),
                        "non-recoverable fault while ingesting report, dead-lettering"
                    );
                    if self.dead_letter(&envelope).await {
                        self.ack().await;
                    }
                    return;
                }
            }
        }
    }

    /// Returns whether the publish succeeded. On failure the envelope is
    /// left unacknowledged so the bus redelivers it.
    async fn dead_letter(&self, envelope: &IncomingEnvelope) -> bool {
        let outbound = OutboundRecord {
            cluster: self.dead_letter_cluster.clone(),
            topic: self.dead_letter_topic.clone(),
            key: envelope.key.clone(),
            payload: envelope.payload.clone(),
            headers: envelope.headers.clone(),
            trace: None,
        };
        match self.dead_letters.send(&outbound).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "dead-letter publish failed, leaving report unacknowledged");
                false
            }
        }
    }

    async fn ack(&mut self) {
        if let Err(err) = self.source.ack().await {
            // Redelivery is safe; ingestion dedup drops the duplicate.
            error!(error = %err, "acknowledge failed");
        }
    }
}

/// Decode a consumed report payload, tolerating both framed and bare JSON.
pub fn decode_report(payload: &[u8]) -> Result<FailureReport, serde_json::Error> {
    let body = RecordFormat::sniff(payload)
        .and_then(|format| format.strip(payload))
        .unwrap_or(payload);
    serde_json::from_slice(body)
}
