// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result processing: retries, terminal failures, duplicates, correlation

use super::*;
use chrono::{Duration, TimeZone, Utc};
use convoy_core::{
    Batch, BatchStatus, Clock, JobCorrelationData, MemberStatus, PhaseStatus, StepExecutionId,
    StepStatus,
};
use convoy_storage::Store;
use crate::EngineError;
use serde_json::json;

const QUERY: &str = "SELECT * FROM moves";

const RETRY_RUNBOOK: &str = r#"
name = "mailbox-move"

[data_source]
type = "sql"
connection = "c"
query = "SELECT * FROM moves"
primary_key = "Upn"
batch_time_column = "MoveDate"

[[phase]]
name = "migrate"
offset = "T-0"

[[phase.step]]
name = "sync-mailbox"
worker_id = "mailbox-worker"
function = "sync-mailbox"
on_failure = "cleanup"
[phase.step.retry]
max_retries = 1
interval = "30s"

[[rollbacks.cleanup]]
name = "undo-sync"
worker_id = "mailbox-worker"
function = "undo-sync"
"#;

/// Detect a batch for `runbook` and tick at the given wall-clock time so
/// only the phases due by then fire.
async fn fired_batch_at(h: &Harness, runbook: &str, hour: u32, minute: u32) -> Batch {
    h.publish(runbook).await;
    h.source
        .set_rows(QUERY, vec![move_row("u1", "2030-01-01T10:00:00Z")]);
    h.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 1, hour, minute, 0).unwrap());
    h.tick().await;
    h.store
        .active_batches_for_runbook("mailbox-move")
        .await
        .unwrap()
        .remove(0)
}

async fn fired_batch(h: &Harness, runbook: &str) -> Batch {
    fired_batch_at(h, runbook, 10, 0).await
}

#[tokio::test]
async fn failure_with_retries_left_schedules_retry_check() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, RETRY_RUNBOOK).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    h.fail(&job, "throttled").await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(step.retry_count, 1);
    assert_eq!(
        step.retry_after,
        Some(h.clock.now() + Duration::seconds(30))
    );

    // Nothing redispatched until the scheduled retry-check fires.
    assert!(h.take_jobs("mailbox-worker").await.is_empty());
    h.clock.advance(Duration::seconds(30));
    h.pump().await;

    let retried = h.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(
        retried.job_id.as_str(),
        format!("step-{}-retry-1", step.id)
    );
}

#[tokio::test]
async fn retry_exhaustion_cascades_member_phase_batch_and_rollback() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, RETRY_RUNBOOK).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    // First attempt fails, retry fires, second attempt fails too.
    h.fail(&job, "throttled").await;
    h.clock.advance(Duration::seconds(30));
    h.pump().await;
    let retried = h.take_jobs("mailbox-worker").await.remove(0);
    h.fail(&retried, "still throttled").await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error_message.as_deref(), Some("still throttled"));

    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(member.status, MemberStatus::Failed);
    assert_eq!(
        h.store
            .get_phase_execution(phases[0].id)
            .await
            .unwrap()
            .unwrap()
            .status,
        PhaseStatus::Failed
    );
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        BatchStatus::Failed
    );

    // The rollback sequence went out fire-and-forget.
    let rollbacks = h.take_jobs("mailbox-worker").await;
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].function_name, "undo-sync");
    assert!(rollbacks[0].correlation_data.step_execution_id.is_none());
}

#[tokio::test]
async fn stale_retry_check_is_dropped() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, RETRY_RUNBOOK).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.fail(&job, "throttled").await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);

    // A check with a mismatched count (e.g. from a superseded schedule)
    // does nothing.
    let stale = convoy_core::OrchestratorEvent::RetryCheck(convoy_core::RetryCheckMsg {
        step_execution_id: Some(step.id),
        init_execution_id: None,
        retry_count: 99,
    });
    h.orchestrator.handle_event(stale).await.unwrap();
    assert!(h.take_jobs("mailbox-worker").await.is_empty());
    assert_eq!(
        h.store
            .get_step_execution(step.id)
            .await
            .unwrap()
            .unwrap()
            .status,
        StepStatus::Pending
    );
}

#[tokio::test]
async fn late_duplicate_result_is_ignored() {
    let h = Harness::new().await;
    let batch = fired_batch_at(&h, TWO_PHASE_RUNBOOK, 9, 5).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    h.succeed(&job, json!({"mailboxGuid": "abc"})).await;
    // Redelivered result with a different body: terminal row, no effect.
    h.orchestrator
        .handle_worker_result(worker_result(
            &job,
            convoy_core::WorkerResultStatus::Failure,
            None,
            None,
        ))
        .await
        .unwrap();

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let prepare = phases.iter().find(|p| p.phase_name == "prepare").unwrap();
    let step = h
        .store
        .steps_of_phase(prepare.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Succeeded);
}

#[tokio::test]
async fn replaying_a_success_result_is_idempotent() {
    let h = Harness::new().await;
    let batch = fired_batch_at(&h, TWO_PHASE_RUNBOOK, 9, 5).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    h.succeed(&job, json!({"mailboxGuid": "abc"})).await;
    h.succeed(&job, json!({"mailboxGuid": "other"})).await;

    // Second replay did not overwrite the merged data or re-advance.
    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(member.worker_data_json["MailboxGuid"], json!("abc"));
}

#[tokio::test]
async fn missing_correlation_dead_letters() {
    let h = Harness::new().await;
    let err = h
        .orchestrator
        .handle_worker_result(result_with_correlation("step-1", None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadLetter { ref reason } if reason == "MissingCorrelationData"));
}

#[tokio::test]
async fn ambiguous_correlation_dead_letters() {
    let h = Harness::new().await;
    let err = h
        .orchestrator
        .handle_worker_result(result_with_correlation(
            "step-1",
            Some(JobCorrelationData {
                step_execution_id: Some(StepExecutionId::new(1)),
                init_execution_id: Some(convoy_core::InitExecutionId::new(1)),
                is_init_step: false,
                runbook_name: "mailbox-move".to_string(),
                runbook_version: 1,
            }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadLetter { ref reason } if reason.contains("InvalidCorrelationData")));
}

#[tokio::test]
async fn unknown_execution_id_dead_letters() {
    let h = Harness::new().await;
    let err = h
        .orchestrator
        .handle_worker_result(result_with_correlation(
            "step-404",
            Some(JobCorrelationData {
                step_execution_id: Some(StepExecutionId::new(404)),
                init_execution_id: None,
                is_init_step: false,
                runbook_name: "mailbox-move".to_string(),
                runbook_version: 1,
            }),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeadLetter { ref reason } if reason.contains("404")));
}

#[tokio::test]
async fn max_retries_zero_fails_immediately_even_with_global_default() {
    let h = Harness::new().await;
    let runbook = r#"
name = "mailbox-move"

[retry]
max_retries = 5
interval = "1m"

[data_source]
type = "sql"
connection = "c"
query = "SELECT * FROM moves"
primary_key = "Upn"
batch_time_column = "MoveDate"

[[phase]]
name = "migrate"
offset = "T-0"

[[phase.step]]
name = "no-retry"
worker_id = "mailbox-worker"
function = "no-retry"
[phase.step.retry]
max_retries = 0
interval = "1s"
"#;
    let batch = fired_batch(&h, runbook).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    h.fail(&job, "boom").await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.retry_count, 0);
}
