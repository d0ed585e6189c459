use std::sync::atomic::Ordering;

use busbar_domain::pagination::Page;
use busbar_domain::temporality::Temporality;
use busbar_recovery::domain::types::{FailureState, ScheduledRetry};
use busbar_recovery::error::RecoveryError;
use busbar_recovery::usecase::query::{GetFailureUseCase, ListFailuresByStateUseCase};
use busbar_recovery::usecase::replay::{ORIGIN_SERVICE_HEADER, TARGET_SERVICE_HEADER};
use busbar_recovery::usecase::sync::SynchronizeTasksUseCase;
use chrono::Utc;
use uuid::Uuid;

use crate::helpers::{Harness, MockRecordRepo, TestLifecycle, stored_event, stored_record};

fn synchronizer(harness: &Harness) -> SynchronizeTasksUseCase<MockRecordRepo, TestLifecycle> {
    SynchronizeTasksUseCase {
        records: harness.lifecycle.records.clone(),
        driver: harness.lifecycle.clone(),
        chunk_size: 10,
        max_chunks: 3,
    }
}

// ── Manual resend ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_finalize_a_pending_record_on_manual_resend() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::RetryPending);
    harness.seed_record(record.clone());
    let now = Utc::now();
    harness.seed_retry(ScheduledRetry::new(
        record.id,
        now + chrono::Duration::seconds(30),
        now,
    ));

    harness.lifecycle.manual_resend(record.id).await.unwrap();

    assert_eq!(
        harness.record(record.id).state,
        FailureState::RetriedAfterTemporary
    );

    // The causing message went back out on its origin cluster, byte-exact,
    // with the replay markers appended.
    let sent = harness.bus_sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cluster, "main");
    assert_eq!(sent[0].topic, "order-events");
    assert_eq!(sent[0].key, event.key);
    assert_eq!(sent[0].payload, event.payload);
    let header = |name: &str| {
        sent[0]
            .headers
            .iter()
            .find(|h| h.name == name)
            .unwrap_or_else(|| panic!("missing header {name}"))
            .value
            .clone()
    };
    assert_eq!(header(TARGET_SERVICE_HEADER), b"billing");
    assert_eq!(header(ORIGIN_SERVICE_HEADER), b"recovery");

    // The manual resend superseded the scheduled one.
    assert!(harness.retries.lock().unwrap().iter().all(|r| r.cancelled));

    let audits = harness.audits.lock().unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, "RESEND");
    assert_eq!(audits[0].record_id, record.id);
}

#[tokio::test]
async fn should_finalize_an_awaiting_task_record_on_manual_resend() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::AwaitingManualTask);
    harness.seed_record(record.clone());

    harness.lifecycle.manual_resend(record.id).await.unwrap();

    assert_eq!(
        harness.record(record.id).state,
        FailureState::RetriedAfterPermanent
    );
    assert!(harness.created_tasks.lock().unwrap().is_empty());
    assert!(harness.closed_tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_close_the_task_when_resending_an_open_task_record() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let mut record = stored_record(event.id, FailureState::OpenManualTask);
    let task_id = Uuid::now_v7();
    record.task_id = Some(task_id);
    harness.seed_record(record.clone());

    harness.lifecycle.manual_resend(record.id).await.unwrap();

    assert_eq!(
        harness.record(record.id).state,
        FailureState::RetriedAfterPermanent
    );
    assert_eq!(*harness.closed_tasks.lock().unwrap(), vec![task_id]);
    assert_eq!(harness.bus_sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_park_the_close_and_let_the_synchronizer_finish_it() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let mut record = stored_record(event.id, FailureState::OpenManualTask);
    let task_id = Uuid::now_v7();
    record.task_id = Some(task_id);
    harness.seed_record(record.clone());
    harness.task_system_down.store(true, Ordering::SeqCst);

    // The resend itself succeeds; only the task close stays pending.
    harness.lifecycle.manual_resend(record.id).await.unwrap();
    assert_eq!(
        harness.record(record.id).state,
        FailureState::AwaitingTaskClose
    );
    assert!(harness.closed_tasks.lock().unwrap().is_empty());

    harness.task_system_down.store(false, Ordering::SeqCst);
    let moved = synchronizer(&harness).execute().await.unwrap();

    assert_eq!(moved, 1);
    assert_eq!(
        harness.record(record.id).state,
        FailureState::RetriedAfterPermanent
    );
    assert_eq!(*harness.closed_tasks.lock().unwrap(), vec![task_id]);
}

#[tokio::test]
async fn should_open_parked_tasks_when_the_synchronizer_runs() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::AwaitingManualTask);
    harness.seed_record(record.clone());

    let moved = synchronizer(&harness).execute().await.unwrap();

    assert_eq!(moved, 1);
    let stored = harness.record(record.id);
    assert_eq!(stored.state, FailureState::OpenManualTask);
    assert!(stored.task_id.is_some());
    assert_eq!(harness.created_tasks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_reject_a_resend_of_a_finalized_record() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::RetriedAfterTemporary);
    harness.seed_record(record.clone());

    let err = harness.lifecycle.manual_resend(record.id).await.unwrap_err();

    assert!(matches!(
        err,
        RecoveryError::NotRetryable(FailureState::RetriedAfterTemporary)
    ));
    assert!(harness.bus_sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_report_an_unknown_record_on_resend() {
    let harness = Harness::new();
    let err = harness
        .lifecycle
        .manual_resend(Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, RecoveryError::RecordNotFound));
}

#[tokio::test]
async fn should_route_a_resend_during_task_deletion_by_temporality() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());

    let mut temporary = stored_record(event.id, FailureState::AwaitingTaskDelete);
    temporary.temporality = Temporality::Temporary;
    harness.seed_record(temporary.clone());
    harness.lifecycle.mark_retried(&mut temporary).await.unwrap();
    assert_eq!(temporary.state, FailureState::RetriedAfterTemporary);

    let mut permanent = stored_record(event.id, FailureState::AwaitingTaskDelete);
    harness.seed_record(permanent.clone());
    harness.lifecycle.mark_retried(&mut permanent).await.unwrap();
    assert_eq!(permanent.state, FailureState::RetriedAfterPermanent);

    let mut unknown = stored_record(event.id, FailureState::AwaitingTaskDelete);
    unknown.temporality = Temporality::Unknown;
    harness.seed_record(unknown.clone());
    let err = harness.lifecycle.mark_retried(&mut unknown).await.unwrap_err();
    assert!(matches!(
        err,
        RecoveryError::NotRetryable(FailureState::AwaitingTaskDelete)
    ));
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_close_a_pending_record_and_cancel_its_retry_on_delete() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::RetryPending);
    harness.seed_record(record.clone());
    let now = Utc::now();
    harness.seed_retry(ScheduledRetry::new(
        record.id,
        now + chrono::Duration::seconds(30),
        now,
    ));

    harness
        .lifecycle
        .delete(record.id, Some("  superseded by manual fix  "))
        .await
        .unwrap();

    let stored = harness.record(record.id);
    assert_eq!(stored.state, FailureState::Closed);
    assert_eq!(stored.closing_reason.as_deref(), Some("superseded by manual fix"));
    assert!(harness.retries.lock().unwrap().iter().all(|r| r.cancelled));
    assert!(harness.bus_sent.lock().unwrap().is_empty());

    let audits = harness.audits.lock().unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, "DELETE");
    assert_eq!(audits[0].state, FailureState::Closed);
    assert_eq!(audits[0].reason.as_deref(), Some("superseded by manual fix"));
}

#[tokio::test]
async fn should_close_an_awaiting_task_record_on_delete() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::AwaitingManualTask);
    harness.seed_record(record.clone());

    harness.lifecycle.delete(record.id, None).await.unwrap();

    let stored = harness.record(record.id);
    assert_eq!(stored.state, FailureState::Closed);
    assert_eq!(stored.closing_reason, None);
}

#[tokio::test]
async fn should_chain_a_task_delete_for_an_open_task_record() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let mut record = stored_record(event.id, FailureState::OpenManualTask);
    let task_id = Uuid::now_v7();
    record.task_id = Some(task_id);
    harness.seed_record(record.clone());

    harness
        .lifecycle
        .delete(record.id, Some("not reproducible"))
        .await
        .unwrap();

    assert_eq!(harness.record(record.id).state, FailureState::Closed);
    assert_eq!(*harness.closed_tasks.lock().unwrap(), vec![task_id]);

    // The audit entry is written at the deletion decision, while the task
    // close was still outstanding.
    let audits = harness.audits.lock().unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].state, FailureState::AwaitingTaskDelete);
}

#[tokio::test]
async fn should_park_the_task_delete_and_let_the_synchronizer_finish_it() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let mut record = stored_record(event.id, FailureState::OpenManualTask);
    let task_id = Uuid::now_v7();
    record.task_id = Some(task_id);
    harness.seed_record(record.clone());
    harness.task_system_down.store(true, Ordering::SeqCst);

    harness.lifecycle.delete(record.id, None).await.unwrap();
    assert_eq!(
        harness.record(record.id).state,
        FailureState::AwaitingTaskDelete
    );

    harness.task_system_down.store(false, Ordering::SeqCst);
    let moved = synchronizer(&harness).execute().await.unwrap();

    assert_eq!(moved, 1);
    assert_eq!(harness.record(record.id).state, FailureState::Closed);
    assert_eq!(*harness.closed_tasks.lock().unwrap(), vec![task_id]);
}

#[tokio::test]
async fn should_reject_an_oversized_closing_reason() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::RetryPending);
    harness.seed_record(record.clone());

    let err = harness
        .lifecycle
        .delete(record.id, Some(&"x".repeat(1001)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "VALIDATION");
    assert_eq!(harness.record(record.id).state, FailureState::RetryPending);
}

#[tokio::test]
async fn should_drop_a_blank_closing_reason() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::AwaitingManualTask);
    harness.seed_record(record.clone());

    harness.lifecycle.delete(record.id, Some("   ")).await.unwrap();

    assert_eq!(harness.record(record.id).closing_reason, None);
}

#[tokio::test]
async fn should_reject_delete_in_final_or_transitional_states() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let states = [
        FailureState::RetriedAfterTemporary,
        FailureState::AwaitingTaskClose,
        FailureState::RetriedAfterPermanent,
        FailureState::AwaitingTaskDelete,
        FailureState::Closed,
    ];

    for state in states {
        let record = stored_record(event.id, state);
        harness.seed_record(record.clone());
        let err = harness.lifecycle.delete(record.id, None).await.unwrap_err();
        assert!(
            matches!(err, RecoveryError::NotDeletable(s) if s == state),
            "unexpected error for {state}: {err}"
        );
    }
    assert!(harness.audits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_report_an_unknown_record_on_delete() {
    let harness = Harness::new();
    let err = harness
        .lifecycle
        .delete(Uuid::now_v7(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RecoveryError::RecordNotFound));
}

// ── Admin queries ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_page_failures_by_state_with_the_overall_count() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    for _ in 0..3 {
        harness.seed_record(stored_record(event.id, FailureState::RetryPending));
    }
    harness.seed_record(stored_record(event.id, FailureState::Closed));

    let usecase = ListFailuresByStateUseCase {
        records: harness.lifecycle.records.clone(),
    };
    let page = usecase
        .execute(FailureState::RetryPending, Page::new(1, 2))
        .await
        .unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.total, 3);
    assert!(page.records.iter().all(|r| r.state == FailureState::RetryPending));
}

#[tokio::test]
async fn should_get_a_stored_failure_by_id() {
    let harness = Harness::new();
    let event = stored_event();
    harness.seed_event(event.clone());
    let record = stored_record(event.id, FailureState::RetryPending);
    harness.seed_record(record.clone());

    let usecase = GetFailureUseCase {
        records: harness.lifecycle.records.clone(),
    };
    let found = usecase.execute(record.id).await.unwrap();
    assert_eq!(found.id, record.id);

    let err = usecase.execute(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, RecoveryError::RecordNotFound));
}
