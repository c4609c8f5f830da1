// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `phase-due`: step creation and per-member dispatch ordering

use super::*;
use chrono::{TimeZone, Utc};
use convoy_core::{Batch, StepStatus};
use convoy_storage::Store;
use serde_json::json;

const QUERY: &str = "SELECT * FROM moves";

/// Two-step single-phase runbook: the second step consumes the first
/// step's output.
const CHAINED_RUNBOOK: &str = r#"
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
name = "get-mailbox"
worker_id = "mailbox-worker"
function = "get-mailbox"
[phase.step.params]
User = "{{Upn}}"
[phase.step.output_params]
MailboxGuid = "mailboxGuid"

[[phase.step]]
name = "set-guids"
worker_id = "mailbox-worker"
function = "set-guids"
[phase.step.params]
Guid = "{{MailboxGuid}}"
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
async fn phase_due_creates_rows_for_members_cross_steps() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, CHAINED_RUNBOOK, &["u1", "u2"]).await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    // 2 members × 2 steps.
    assert_eq!(steps.len(), 4);

    // Lowest-indexed step per member is dispatched; later steps wait.
    for member_steps in steps.chunks(2) {
        assert_eq!(member_steps[0].status, StepStatus::Dispatched);
        assert_eq!(member_steps[1].status, StepStatus::Pending);
    }

    // Members dispatch concurrently: one job per member.
    let jobs = h.take_jobs("mailbox-worker").await;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.function_name == "get-mailbox"));
}

#[tokio::test]
async fn unresolved_output_placeholder_is_stored_raw() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, CHAINED_RUNBOOK, &["u1"]).await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    let set_guids = steps.iter().find(|s| s.step_name == "set-guids").unwrap();
    // {{MailboxGuid}} is produced by get-mailbox; at creation it stays raw.
    assert_eq!(set_guids.params_json["Guid"], "{{MailboxGuid}}");
}

#[tokio::test]
async fn next_step_dispatches_with_resolved_output_after_success() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, CHAINED_RUNBOOK, &["u1"]).await;

    let job = h.take_jobs("mailbox-worker").await.remove(0);
    h.succeed(&job, json!({"mailboxGuid": "abc"})).await;

    let next = h.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(next.function_name, "set-guids");
    // Re-resolved at dispatch from the merged worker data.
    assert_eq!(next.parameters["Guid"], "abc");

    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(member.worker_data_json["MailboxGuid"], json!("abc"));
}

#[tokio::test]
async fn replayed_phase_due_is_idempotent() {
    let h = Harness::new().await;
    let batch = fired_batch(&h, CHAINED_RUNBOOK, &["u1"]).await;
    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(h.take_jobs("mailbox-worker").await.len(), 1);

    let members = h.store.members_of_batch(batch.id).await.unwrap();
    let event = convoy_core::OrchestratorEvent::PhaseDue(convoy_core::PhaseDueMsg {
        phase_execution_id: phases[0].id,
        phase_name: phases[0].phase_name.clone(),
        batch_id: batch.id,
        runbook_name: "mailbox-move".to_string(),
        runbook_version: 1,
        offset_minutes: 0,
        due_at: phases[0].due_at,
        member_ids: members.iter().map(|m| m.id).collect(),
    });
    h.orchestrator.handle_event(event.clone()).await.unwrap();
    h.orchestrator.handle_event(event).await.unwrap();

    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    assert_eq!(steps.len(), 2);
    // In-flight step not re-dispatched; dedup also swallowed any repeat.
    assert!(h.take_jobs("mailbox-worker").await.is_empty());
}

#[tokio::test]
async fn dispatch_failure_on_unresolvable_params_fails_step_and_member() {
    let h = Harness::new().await;
    // Single step referencing a name nothing ever provides.
    let runbook = r#"
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
name = "use-missing"
worker_id = "mailbox-worker"
function = "use-missing"
[phase.step.params]
Value = "{{NeverProduced}}"
"#;
    let batch = fired_batch(&h, runbook, &["u1"]).await;

    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    let steps = h.store.steps_of_phase(phases[0].id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Failed);
    let error = steps[0].error_message.as_deref().unwrap();
    assert!(error.contains("NeverProduced"), "missing names listed: {error}");

    let member = h
        .store
        .members_of_batch(batch.id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(member.status, convoy_core::MemberStatus::Failed);
    assert!(h.take_jobs("mailbox-worker").await.is_empty());
}
