use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::temporality::Temporality;
use crate::trace::TraceContext;

/// Placeholder for metadata a reporter failed to capture.
pub const UNKNOWN: &str = "UNKNOWN";

/// Service that published a message (or a failure report).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl Publisher {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            system: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Envelope metadata every busbar message carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: String,
    pub event_type: EventType,
    pub publisher: Publisher,
    /// Reporters reuse this id across redeliveries of the same report.
    pub idempotence_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// One transport header of the causing message, value kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// What went wrong, as judged by the reporting consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
    /// Longer human-oriented account, when the reporter has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub temporality: Temporality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Verbatim copy of the message whose processing failed.
///
/// `metadata` is optional: a consumer that could not even decode the
/// message cannot tell who published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausingMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    pub topic: String,
    /// Bus cluster the consumer read the message from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

/// A processing-failure report as published by consumer services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Metadata of the report message itself.
    pub metadata: EventMetadata,
    pub error: ErrorDescriptor,
    pub causing: CausingMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,
}

impl FailureReport {
    /// Identity used for at-least-once delivery dedup: reporters reuse the
    /// idempotence id when they redeliver, and ids are only unique within
    /// one reporting service.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.metadata.idempotence_id, &self.metadata.publisher.service)
    }
}
