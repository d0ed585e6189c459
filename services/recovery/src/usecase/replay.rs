use std::time::Duration;

use tracing::info;

use busbar_domain::report::Header;

use crate::domain::repository::BusSender;
use crate::domain::types::{CausingEvent, ClusterTopology, FailureRecord, OutboundRecord};
use crate::error::RecoveryError;

/// Header naming the service that must reprocess a replayed message.
/// Consumers of other services see the marker and skip the replay.
pub const TARGET_SERVICE_HEADER: &str = "bb-recovery-target";

/// Header naming the service that performed the replay.
pub const ORIGIN_SERVICE_HEADER: &str = "bb-recovery-origin";

/// Puts a stored causing message back on the bus, byte for byte.
///
/// The payload, key and topic are republished untouched; only the recovery
/// marker headers are rewritten so exactly one consumer picks the message
/// up again.
#[derive(Clone)]
pub struct EventReplayer<B>
where
    B: BusSender,
{
    pub bus: B,
    pub topology: ClusterTopology,
    /// Our own service name, stamped as the replay origin.
    pub service_name: String,
    /// How long to wait for the bus to acknowledge the send.
    pub ack_timeout: Duration,
}

impl<B> EventReplayer<B>
where
    B: BusSender,
{
    pub async fn replay(
        &self,
        record: &FailureRecord,
        event: &CausingEvent,
    ) -> Result<(), RecoveryError> {
        let cluster = self.topology.select(event.cluster.as_deref(), &event.payload)?;
        let outbound = OutboundRecord {
            cluster,
            topic: event.topic.clone(),
            key: event.key.clone(),
            payload: event.payload.clone(),
            headers: self.replay_headers(record, event),
            trace: record.trace.clone(),
        };
        match tokio::time::timeout(self.ack_timeout, self.bus.send(&outbound)).await {
            Ok(Ok(())) => {
                info!(
                    record_id = %record.id,
                    topic = %outbound.topic,
                    cluster = %outbound.cluster,
                    "replayed causing message"
                );
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(RecoveryError::ReplayTimeout(self.ack_timeout)),
        }
    }

    /// The original headers minus any stale markers, plus fresh ones.
    ///
    /// The target names the consumer that reported the failure; every other
    /// subscriber on the topic sees the marker and skips the replay. A
    /// message that already went through recovery once carries old markers,
    /// so those are stripped before the new pair goes on.
    fn replay_headers(&self, record: &FailureRecord, event: &CausingEvent) -> Vec<Header> {
        let mut headers: Vec<Header> = event
            .headers
            .iter()
            .filter(|h| h.name != TARGET_SERVICE_HEADER && h.name != ORIGIN_SERVICE_HEADER)
            .cloned()
            .collect();
        headers.push(Header::new(
            TARGET_SERVICE_HEADER,
            record.reporter_service.as_bytes(),
        ));
        headers.push(Header::new(
            ORIGIN_SERVICE_HEADER,
            self.service_name.as_bytes(),
        ));
        headers
    }
}
