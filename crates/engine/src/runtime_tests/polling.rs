// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Polling: in-progress bookkeeping, poll calls, completion, timeout

use super::*;
use chrono::{Duration, TimeZone, Utc};
use convoy_core::{Batch, BatchStatus, Clock, MemberStatus, PhaseStatus, StepStatus};
use convoy_storage::Store;
use serde_json::json;

const QUERY: &str = "SELECT * FROM moves";

const POLLING_RUNBOOK: &str = r#"
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
[phase.step.poll]
interval = "5m"
timeout = "1h"
[phase.step.output_params]
BytesMoved = "bytesMoved"
"#;

async fn polling_batch(h: &Harness) -> Batch {
    h.publish(POLLING_RUNBOOK).await;
    h.source
        .set_rows(QUERY, vec![move_row("u1", "2030-01-01T10:00:00Z")]);
    h.clock.set(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap());
    h.tick().await;
    h.store
        .active_batches_for_runbook("mailbox-move")
        .await
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn incomplete_poll_response_moves_step_to_polling() {
    let h = Harness::new().await;
    let batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    h.poll_response(&job, false, None).await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Polling);
    assert_eq!(step.poll_count, 1);
    assert_eq!(step.poll_started_at, Some(h.clock.now()));
    assert_eq!(step.last_polled_at, Some(h.clock.now()));
}

#[tokio::test]
async fn poll_check_republishes_job_as_poll_call() {
    let h = Harness::new().await;
    let batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.poll_response(&job, false, None).await;

    // The scheduled poll-check fires after the 5m interval.
    h.clock.advance(Duration::minutes(5));
    h.pump().await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    let polls = h.take_jobs("mailbox-worker").await;
    assert_eq!(polls.len(), 1);
    assert!(polls[0].is_poll_call);
    assert_eq!(
        polls[0].job_id.as_str(),
        format!("step-{}-poll-{}", step.id, step.poll_count)
    );
}

#[tokio::test]
async fn complete_poll_response_succeeds_with_outputs_from_data() {
    let h = Harness::new().await;
    let batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.poll_response(&job, false, None).await;

    h.poll_response(&job, true, Some(json!({"bytesMoved": "42"})))
        .await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Succeeded);

    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(member.worker_data_json["BytesMoved"], json!("42"));
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        BatchStatus::Completed
    );
}

#[tokio::test]
async fn poll_timeout_expires_without_retry() {
    let h = Harness::new().await;
    let batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.poll_response(&job, false, None).await;

    // Keep reporting in-progress every 5 minutes for an hour.
    for _ in 0..12 {
        h.clock.advance(Duration::minutes(5));
        h.pump().await;
        for poll in h.take_jobs("mailbox-worker").await {
            h.poll_response(&poll, false, None).await;
        }
    }

    // Past the 1h budget the next poll-check expires the step.
    h.clock.advance(Duration::minutes(6));
    h.pump().await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::PollTimeout);
    assert_eq!(step.retry_count, 0);

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
}

#[tokio::test]
async fn poll_check_on_terminal_step_is_dropped() {
    let h = Harness::new().await;
    let batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.poll_response(&job, false, None).await;
    h.poll_response(&job, true, None).await;

    // The scheduled check arrives after completion: no-op.
    h.clock.advance(Duration::minutes(5));
    h.pump().await;
    assert!(h.take_jobs("mailbox-worker").await.is_empty());

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let step = h
        .store
        .steps_of_phase(phases[0].id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(step.status, StepStatus::Succeeded);
}

#[tokio::test]
async fn unrecognized_poll_shape_dead_letters() {
    let h = Harness::new().await;
    let _batch = polling_batch(&h).await;
    let job = h.take_jobs("mailbox-worker").await.remove(0);

    let err = h
        .orchestrator
        .handle_worker_result(worker_result(
            &job,
            convoy_core::WorkerResultStatus::Success,
            Some(json!({"done": "yes"})),
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::EngineError::DeadLetter { ref reason } if reason.contains("unrecognized poll result shape")
    ));
}
