// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Member churn: catch-up for late adds, cancellation on removal

use super::*;
use chrono::{TimeZone, Utc};
use convoy_core::{Batch, MemberStatus, PhaseStatus, StepStatus};
use convoy_storage::Store;
use serde_json::json;

const QUERY: &str = "SELECT * FROM moves";

const REMOVAL_RUNBOOK: &str = r#"
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

[[on_member_removed]]
name = "notify-removed"
worker_id = "notification-worker"
function = "send-removed-notice"
[on_member_removed.params]
User = "{{Upn}}"
"#;

async fn fired_batch(h: &Harness, runbook: &str, members: &[&str]) -> Batch {
    h.publish(runbook).await;
    let rows = members
        .iter()
        .map(|upn| move_row(upn, "2030-01-01T10:00:00Z"))
        .collect();
    h.source.set_rows(QUERY, rows);
    h.clock.set(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap());
    h.tick().await;
    h.store
        .active_batches_for_runbook("mailbox-move")
        .await
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn late_member_catches_up_with_dispatched_phase() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, REMOVAL_RUNBOOK, &["u1"]).await;
    assert_eq!(h.take_jobs("mailbox-worker").await.len(), 1);

    // u2 shows up in the source on the next tick.
    h.source.set_rows(
        QUERY,
        vec![
            move_row("u1", "2030-01-01T10:00:00Z"),
            move_row("u2", "2030-01-01T10:00:00Z"),
        ],
    );
    h.tick().await;

    let members = h.store.members_of_batch(batch.id).await.unwrap();
    let u2 = members.iter().find(|m| m.member_key == "u2").unwrap();
    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    let u2_steps: Vec<_> = steps
        .iter()
        .filter(|s| s.batch_member_id == u2.id)
        .collect();
    assert_eq!(u2_steps.len(), 1);
    assert_eq!(u2_steps[0].status, StepStatus::Dispatched);

    let jobs = h.take_jobs("mailbox-worker").await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["User"], "u2");
}

#[tokio::test]
async fn removed_member_work_is_cancelled_and_sequence_fired() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, REMOVAL_RUNBOOK, &["u1", "u2"]).await;
    assert_eq!(h.take_jobs("mailbox-worker").await.len(), 2);

    // u2 leaves the source.
    h.source
        .set_rows(QUERY, vec![move_row("u1", "2030-01-01T10:00:00Z")]);
    h.tick().await;

    let members = h.store.members_of_batch(batch.id).await.unwrap();
    let u2 = members.iter().find(|m| m.member_key == "u2").unwrap();
    assert_eq!(u2.status, MemberStatus::Removed);
    assert!(u2.removed_at.is_some());

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    let u2_step = steps.iter().find(|s| s.batch_member_id == u2.id).unwrap();
    assert_eq!(u2_step.status, StepStatus::Cancelled);

    // The on_member_removed sequence fired with the member's context.
    let notices = h.take_jobs("notification-worker").await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].function_name, "send-removed-notice");
    assert_eq!(notices[0].parameters["User"], "u2");
}

#[tokio::test]
async fn removal_does_not_block_phase_completion() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, REMOVAL_RUNBOOK, &["u1", "u2"]).await;
    let jobs = h.take_jobs("mailbox-worker").await;

    // u1 finishes; u2 is removed before its job ever completes.
    let u1_job = jobs.iter().find(|j| j.parameters["User"] == "u1").unwrap();
    h.succeed(u1_job, json!({})).await;
    h.source
        .set_rows(QUERY, vec![move_row("u1", "2030-01-01T10:00:00Z")]);
    h.tick().await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(phases[0].status, PhaseStatus::Completed);
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        convoy_core::BatchStatus::Completed
    );
}

#[tokio::test]
async fn member_added_is_idempotent() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, REMOVAL_RUNBOOK, &["u1"]).await;
    assert_eq!(h.take_jobs("mailbox-worker").await.len(), 1);
    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);

    let event = convoy_core::OrchestratorEvent::MemberAdded(convoy_core::MemberEventMsg {
        runbook_name: "mailbox-move".to_string(),
        runbook_version: 1,
        batch_id: batch.id,
        batch_member_id: member.id,
        member_key: member.member_key.clone(),
    });
    h.orchestrator.handle_event(event.clone()).await.unwrap();
    h.orchestrator.handle_event(event).await.unwrap();

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    assert_eq!(steps.len(), 1);
    // The in-flight step was not re-dispatched.
    assert!(h.take_jobs("mailbox-worker").await.is_empty());
}
