//! Canned failure reports for tests.
//!
//! `failure_report()` yields a plausible temporary failure out of the box;
//! chain the setters to vary only what a test cares about.

use busbar_domain::report::{
    CausingMessage, ErrorDescriptor, EventMetadata, EventType, FailureReport, Header, Publisher,
};
use busbar_domain::temporality::Temporality;
use busbar_domain::trace::TraceContext;
use chrono::{DateTime, Utc};

pub fn failure_report() -> ReportBuilder {
    ReportBuilder::default()
}

pub struct ReportBuilder {
    report: FailureReport,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            report: FailureReport {
                metadata: EventMetadata {
                    event_id: "rep-0001".to_owned(),
                    event_type: EventType {
                        name: "message-processing-failed".to_owned(),
                        version: Some("1".to_owned()),
                    },
                    publisher: Publisher::new("billing"),
                    idempotence_id: "idem-0001".to_owned(),
                    created: None,
                },
                error: ErrorDescriptor {
                    code: "TEST_FAILURE".to_owned(),
                    message: "processing failed".to_owned(),
                    description: None,
                    temporality: Temporality::Temporary,
                    stack_trace: None,
                },
                causing: CausingMessage {
                    metadata: Some(EventMetadata {
                        event_id: "evt-0001".to_owned(),
                        event_type: EventType {
                            name: "order-placed".to_owned(),
                            version: Some("1".to_owned()),
                        },
                        publisher: Publisher::new("ordering"),
                        idempotence_id: "src-idem-0001".to_owned(),
                        created: None,
                    }),
                    topic: "order-events".to_owned(),
                    cluster: Some("main".to_owned()),
                    partition: Some(0),
                    offset: Some(0),
                    key: None,
                    payload: b"{}".to_vec(),
                    headers: Vec::new(),
                },
                trace: None,
            },
        }
    }
}

impl ReportBuilder {
    pub fn idempotence_id(mut self, id: &str) -> Self {
        self.report.metadata.idempotence_id = id.to_owned();
        self
    }

    pub fn reporter(mut self, service: &str) -> Self {
        self.report.metadata.publisher = Publisher::new(service);
        self
    }

    pub fn temporality(mut self, temporality: Temporality) -> Self {
        self.report.error.temporality = temporality;
        self
    }

    pub fn error_code(mut self, code: &str) -> Self {
        self.report.error.code = code.to_owned();
        self
    }

    pub fn error_message(mut self, message: &str) -> Self {
        self.report.error.message = message.to_owned();
        self
    }

    pub fn stack_trace(mut self, stack_trace: &str) -> Self {
        self.report.error.stack_trace = Some(stack_trace.to_owned());
        self
    }

    pub fn causing_event(mut self, event_id: &str, event_name: &str) -> Self {
        let metadata = self
            .report
            .causing
            .metadata
            .get_or_insert_with(|| EventMetadata {
                event_id: String::new(),
                event_type: EventType {
                    name: String::new(),
                    version: None,
                },
                publisher: Publisher::new("ordering"),
                idempotence_id: "src-idem-0001".to_owned(),
                created: None,
            });
        metadata.event_id = event_id.to_owned();
        metadata.event_type.name = event_name.to_owned();
        self
    }

    pub fn causing_publisher(mut self, service: &str) -> Self {
        if let Some(metadata) = self.report.causing.metadata.as_mut() {
            metadata.publisher = Publisher::new(service);
        }
        self
    }

    pub fn causing_created(mut self, created: DateTime<Utc>) -> Self {
        if let Some(metadata) = self.report.causing.metadata.as_mut() {
            metadata.created = Some(created);
        }
        self
    }

    pub fn causing_topic(mut self, topic: &str) -> Self {
        self.report.causing.topic = topic.to_owned();
        self
    }

    pub fn causing_cluster(mut self, cluster: Option<&str>) -> Self {
        self.report.causing.cluster = cluster.map(str::to_owned);
        self
    }

    pub fn causing_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.report.causing.payload = payload.into();
        self
    }

    pub fn causing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.report.causing.key = Some(key.into());
        self
    }

    pub fn causing_header(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.report.causing.headers.push(Header::new(name, value));
        self
    }

    /// Simulate a reporter that could not decode the causing message.
    pub fn without_causing_metadata(mut self) -> Self {
        self.report.causing.metadata = None;
        self
    }

    pub fn trace(mut self, trace_id: &str, span_id: &str) -> Self {
        self.report.trace = Some(TraceContext::new(trace_id, span_id));
        self
    }

    pub fn build(self) -> FailureReport {
        self.report
    }
}
