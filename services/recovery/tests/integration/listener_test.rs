use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use busbar_domain::report::FailureReport;
use busbar_domain::wire::RecordFormat;
use busbar_recovery::domain::repository::{ReportHandler, ReportSource};
use busbar_recovery::domain::types::IncomingEnvelope;
use busbar_recovery::error::{BusError, RecoveryError, StoreError};
use busbar_recovery::listener::ReportListener;
use busbar_testing::payload::framed_report;
use busbar_testing::report::failure_report;

use crate::helpers::MockBus;

struct ScriptedSource {
    envelopes: Vec<IncomingEnvelope>,
    acks: Arc<Mutex<u32>>,
}

impl ReportSource for ScriptedSource {
    async fn next(&mut self) -> Result<Option<IncomingEnvelope>, BusError> {
        if self.envelopes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.envelopes.remove(0)))
        }
    }

    async fn ack(&mut self) -> Result<(), BusError> {
        *self.acks.lock().unwrap() += 1;
        Ok(())
    }
}

/// Fails with the scripted errors first, then succeeds forever.
#[derive(Clone)]
struct ScriptedHandler {
    failures: Arc<Mutex<Vec<RecoveryError>>>,
    calls: Arc<Mutex<u32>>,
}

impl ReportHandler for ScriptedHandler {
    async fn handle(&self, _report: FailureReport) -> Result<(), RecoveryError> {
        *self.calls.lock().unwrap() += 1;
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.remove(0))
        }
    }
}

fn transient() -> RecoveryError {
    RecoveryError::Store(StoreError::ConnectionLost(anyhow::anyhow!(
        "connection refused"
    )))
}

fn envelope(payload: Vec<u8>) -> IncomingEnvelope {
    IncomingEnvelope {
        topic: "failure-reports".to_owned(),
        partition: Some(0),
        offset: Some(7),
        key: None,
        payload,
        headers: vec![],
    }
}

fn listener(
    envelopes: Vec<IncomingEnvelope>,
    failures: Vec<RecoveryError>,
) -> (
    ReportListener<ScriptedSource, ScriptedHandler, MockBus>,
    Arc<Mutex<u32>>,
    Arc<Mutex<u32>>,
    MockBus,
) {
    let acks = Arc::new(Mutex::new(0));
    let calls = Arc::new(Mutex::new(0));
    let dead_letters = MockBus {
        sent: Arc::new(Mutex::new(vec![])),
        down: Arc::new(AtomicBool::new(false)),
    };
    let listener = ReportListener {
        source: ScriptedSource {
            envelopes,
            acks: Arc::clone(&acks),
        },
        handler: ScriptedHandler {
            failures: Arc::new(Mutex::new(failures)),
            calls: Arc::clone(&calls),
        },
        dead_letters: dead_letters.clone(),
        dead_letter_topic: "failure-reports-dlt".to_owned(),
        dead_letter_cluster: "main".to_owned(),
        retry_interval: Duration::from_millis(1),
    };
    (listener, acks, calls, dead_letters)
}

fn report_payload() -> Vec<u8> {
    framed_report(RecordFormat::Confluent, &failure_report().build())
}

#[tokio::test]
async fn should_hold_the_report_until_a_recoverable_fault_clears() {
    let (mut listener, acks, calls, dead_letters) =
        listener(vec![], vec![transient(), transient()]);

    listener.process(envelope(report_payload())).await;

    // Two transient store faults, then the ingestion landed.
    assert_eq!(*calls.lock().unwrap(), 3);
    assert_eq!(*acks.lock().unwrap(), 1);
    assert!(dead_letters.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_dead_letter_an_undecodable_payload() {
    let (mut listener, acks, calls, dead_letters) = listener(vec![], vec![]);
    let payload = b"\xff\xfenot a report".to_vec();

    listener.process(envelope(payload.clone())).await;

    assert_eq!(*calls.lock().unwrap(), 0);
    assert_eq!(*acks.lock().unwrap(), 1);
    let sent = dead_letters.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "failure-reports-dlt");
    assert_eq!(sent[0].cluster, "main");
    assert_eq!(sent[0].payload, payload, "the original bytes are preserved");
}

#[tokio::test]
async fn should_dead_letter_a_fatal_fault() {
    let (mut listener, acks, calls, dead_letters) = listener(
        vec![],
        vec![RecoveryError::Validation("unusable report".to_owned())],
    );

    listener.process(envelope(report_payload())).await;

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(*acks.lock().unwrap(), 1);
    assert_eq!(dead_letters.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_leave_the_report_unacknowledged_when_dead_lettering_fails() {
    let (mut listener, acks, calls, dead_letters) = listener(vec![], vec![]);
    dead_letters
        .down
        .store(true, std::sync::atomic::Ordering::SeqCst);

    listener.process(envelope(b"\xff\xfenot a report".to_vec())).await;

    // The bus will redeliver the report once the dead-letter topic works.
    assert_eq!(*calls.lock().unwrap(), 0);
    assert_eq!(*acks.lock().unwrap(), 0);
    assert!(dead_letters.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_drain_the_topic_through_ingestion() {
    let (listener, acks, calls, dead_letters) = listener(
        vec![envelope(report_payload()), envelope(report_payload())],
        vec![],
    );

    let running = tokio::spawn(listener.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    running.abort();

    assert_eq!(*calls.lock().unwrap(), 2);
    assert_eq!(*acks.lock().unwrap(), 2);
    assert!(dead_letters.sent.lock().unwrap().is_empty());
}
