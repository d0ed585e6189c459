use anyhow::Context as _;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use busbar_domain::report::Header;
use busbar_domain::trace::TraceContext;

use crate::domain::repository::{BusSender, ReportSource};
use crate::domain::types::{IncomingEnvelope, OutboundRecord};
use crate::error::BusError;

// ── Send side ────────────────────────────────────────────────────────────────

/// REST client for the message-bus gateway's produce endpoint.
///
/// The gateway owns the actual broker connections per cluster; this
/// service only ever speaks HTTP to it.
#[derive(Clone)]
pub struct GatewayBusClient {
    client: Client,
    base_url: String,
}

impl GatewayBusClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[derive(Serialize)]
struct SendRecordBody<'a> {
    cluster: &'a str,
    topic: &'a str,
    key: Option<&'a [u8]>,
    payload: &'a [u8],
    headers: Vec<WireHeader<'a>>,
    trace: Option<&'a TraceContext>,
}

#[derive(Serialize)]
struct WireHeader<'a> {
    name: &'a str,
    value: &'a [u8],
}

impl BusSender for GatewayBusClient {
    async fn send(&self, record: &OutboundRecord) -> Result<(), BusError> {
        let body = SendRecordBody {
            cluster: &record.cluster,
            topic: &record.topic,
            key: record.key.as_deref(),
            payload: &record.payload,
            headers: record
                .headers
                .iter()
                .map(|h| WireHeader {
                    name: &h.name,
                    value: &h.value,
                })
                .collect(),
            trace: record.trace.as_ref(),
        };
        self.client
            .post(format!("{}/records", self.base_url))
            .json(&body)
            .send()
            .await
            .context("send record to bus gateway")
            .map_err(BusError::Send)?
            .error_for_status()
            .context("bus gateway send status")
            .map_err(BusError::Send)?;
        Ok(())
    }
}

// ── Consume side ─────────────────────────────────────────────────────────────

/// Pull consumer over the gateway's poll/ack endpoints.
///
/// One envelope is in flight at a time; `ack` settles the receipt handed
/// out by the last successful poll.
pub struct GatewayReportSource {
    client: Client,
    base_url: String,
    topic: String,
    group: String,
    pending_receipt: Option<String>,
}

impl GatewayReportSource {
    pub fn new(client: Client, base_url: &str, topic: &str, group: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            topic: topic.to_owned(),
            group: group.to_owned(),
            pending_receipt: None,
        }
    }
}

#[derive(Deserialize)]
struct PolledRecord {
    topic: String,
    #[serde(default)]
    partition: Option<i32>,
    #[serde(default)]
    offset: Option<i64>,
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
    #[serde(default)]
    headers: Vec<PolledHeader>,
    receipt: String,
}

#[derive(Deserialize)]
struct PolledHeader {
    name: String,
    value: Vec<u8>,
}

impl ReportSource for GatewayReportSource {
    async fn next(&mut self) -> Result<Option<IncomingEnvelope>, BusError> {
        let response = self
            .client
            .post(format!("{}/topics/{}/poll", self.base_url, self.topic))
            .query(&[("group", self.group.as_str())])
            .send()
            .await
            .context("poll bus gateway")
            .map_err(BusError::Receive)?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .context("bus gateway poll status")
            .map_err(BusError::Receive)?;
        let polled: PolledRecord = response
            .json()
            .await
            .context("decode polled record")
            .map_err(BusError::Receive)?;
        self.pending_receipt = Some(polled.receipt);
        Ok(Some(IncomingEnvelope {
            topic: polled.topic,
            partition: polled.partition,
            offset: polled.offset,
            key: polled.key,
            payload: polled.payload,
            headers: polled
                .headers
                .into_iter()
                .map(|h| Header::new(h.name, h.value))
                .collect(),
        }))
    }

    async fn ack(&mut self) -> Result<(), BusError> {
        let Some(receipt) = self.pending_receipt.take() else {
            return Ok(());
        };
        self.client
            .post(format!("{}/receipts/{receipt}/ack", self.base_url))
            .send()
            .await
            .context("acknowledge receipt")
            .map_err(BusError::Receive)?
            .error_for_status()
            .context("acknowledge status")
            .map_err(BusError::Receive)?;
        Ok(())
    }
}
