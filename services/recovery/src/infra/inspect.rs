use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use busbar_domain::report::EventMetadata;
use busbar_domain::wire::RecordFormat;

use crate::domain::repository::PayloadProbe;
use crate::domain::types::ClusterTopology;

/// Per-cluster payload decoder.
#[derive(Debug, Clone)]
pub struct PayloadInspector {
    pub cluster: String,
    pub format: RecordFormat,
}

/// Shared registry of payload inspectors, keyed by cluster name.
///
/// Opened once at startup from the cluster topology and closed on
/// shutdown; ingestion and diagnostics share it through cheap clones.
/// After `close` every lookup misses, so late callers degrade to "no
/// metadata" instead of touching torn-down state.
#[derive(Clone)]
pub struct PayloadInspectorRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    inspectors: HashMap<String, PayloadInspector>,
    closed: AtomicBool,
}

impl PayloadInspectorRegistry {
    pub fn open(topology: &ClusterTopology) -> Self {
        let inspectors = topology
            .clusters()
            .iter()
            .map(|cluster| {
                (
                    cluster.name.clone(),
                    PayloadInspector {
                        cluster: cluster.name.clone(),
                        format: cluster.format,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        info!(count = inspectors.len(), "payload inspectors opened");
        Self {
            inner: Arc::new(RegistryInner {
                inspectors,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        info!("payload inspectors closed");
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Best-effort decode of a stored payload into JSON.
    ///
    /// The cluster's configured framing wins while it agrees with the
    /// bytes; otherwise the sniffed framing decides, and unframed bytes
    /// are tried as bare JSON.
    fn decode(&self, cluster: Option<&str>, payload: &[u8]) -> Option<serde_json::Value> {
        if self.is_closed() {
            return None;
        }
        let sniffed = RecordFormat::sniff(payload);
        let format = cluster
            .and_then(|name| self.inner.inspectors.get(name))
            .map(|inspector| inspector.format)
            .filter(|format| sniffed == Some(*format))
            .or(sniffed);
        let body = match format {
            Some(format) => format.strip(payload)?,
            None => payload,
        };
        serde_json::from_slice(body).ok()
    }

    /// Human-readable rendering of a stored payload for diagnostics.
    pub fn describe(&self, cluster: Option<&str>, payload: &[u8]) -> String {
        match self.decode(cluster, payload) {
            Some(value) => value.to_string(),
            None => {
                let head = &payload[..payload.len().min(8)];
                format!("{} opaque bytes, starting {head:02x?}", payload.len())
            }
        }
    }
}

impl PayloadProbe for PayloadInspectorRegistry {
    fn probe_metadata(&self, cluster: Option<&str>, payload: &[u8]) -> Option<EventMetadata> {
        let value = self.decode(cluster, payload)?;
        let metadata = value.get("metadata")?.clone();
        serde_json::from_value(metadata).ok()
    }
}
