// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: version transition on an in-flight batch
//!
//! A batch detected under v1 has one phase dispatched and one pending.
//! Publishing v2 with a different phase set supersedes the pending v1
//! row, creates v2 rows, tags new `phase-due` messages with version 2,
//! and routes late member additions to each phase row's own version.

use crate::prelude::*;
use convoy_core::{PhaseStatus, StepStatus};
use convoy_storage::Store;

const V1: &str = r#"
name = "rb1"

[data_source]
type = "sql"
connection = "src"
query = "SELECT * FROM members"
primary_key = "key"
batch_time_column = "Date"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "stage"
worker_id = "mailbox-worker"
function = "stage-v1"

[[phase]]
name = "cutover"
offset = "T-0"

[[phase.step]]
name = "cut"
worker_id = "mailbox-worker"
function = "cut-v1"
"#;

const V2: &str = r#"
name = "rb1"

[data_source]
type = "sql"
connection = "src"
query = "SELECT * FROM members"
primary_key = "key"
batch_time_column = "Date"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "stage"
worker_id = "mailbox-worker"
function = "stage-v2"

[[phase]]
name = "verify"
offset = "T-0"

[[phase.step]]
name = "verify"
worker_id = "mailbox-worker"
function = "verify-v2"
"#;

#[tokio::test]
async fn version_transition_on_inflight_batch() {
    let w = World::new().await;
    w.publish_runbook(V1).await;
    let date = "2030-01-01T10:00:00Z";
    w.source
        .set_rows("SELECT * FROM members", vec![row(&[("key", "u1"), ("Date", date)])]);

    // Detect under v1 at 09:05: prepare dispatched, cutover pending.
    w.clock.set(at(2030, 1, 1, 9, 5));
    w.tick().await;
    let batch = w
        .store
        .find_batch_by_start_time("rb1", at(2030, 1, 1, 10, 0))
        .await
        .unwrap()
        .unwrap();
    let v1_jobs = w.take_jobs("mailbox-worker").await;
    assert_eq!(v1_jobs[0].function_name, "stage-v1");
    assert_eq!(v1_jobs[0].correlation_data.runbook_version, 1);

    // Operator publishes v2 while the batch is in flight.
    w.publish_runbook(V2).await;
    w.tick().await;

    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    let find = |name: &str, version: i32| {
        phases
            .iter()
            .find(|p| p.phase_name == name && p.runbook_version == version)
    };
    // Pending v1 rows are superseded; dispatched ones are left alone.
    assert_eq!(find("cutover", 1).unwrap().status, PhaseStatus::Superseded);
    assert_eq!(find("prepare", 1).unwrap().status, PhaseStatus::Dispatched);
    // New v2 rows exist: prepare is past due and re-ran, verify waits.
    assert_eq!(find("prepare", 2).unwrap().status, PhaseStatus::Dispatched);
    assert_eq!(find("verify", 2).unwrap().status, PhaseStatus::Pending);

    // The re-run prepare dispatched v2 semantics with a v2 tag.
    let v2_jobs = w.take_jobs("mailbox-worker").await;
    assert_eq!(v2_jobs.len(), 1);
    assert_eq!(v2_jobs[0].function_name, "stage-v2");
    assert_eq!(v2_jobs[0].correlation_data.runbook_version, 2);

    // A late member addition creates catch-up steps per phase row's own
    // version: v1 prepare and v2 prepare, not superseded cutover.
    w.source.set_rows(
        "SELECT * FROM members",
        vec![
            row(&[("key", "u1"), ("Date", date)]),
            row(&[("key", "u2"), ("Date", date)]),
        ],
    );
    w.tick().await;
    let members = w.store.members_of_batch(batch.id).await.unwrap();
    let u2 = members.iter().find(|m| m.member_key == "u2").unwrap();

    let catch_up = w.take_jobs("mailbox-worker").await;
    let mut functions: Vec<&str> = catch_up.iter().map(|j| j.function_name.as_str()).collect();
    functions.sort_unstable();
    assert_eq!(functions, vec!["stage-v1", "stage-v2"]);

    let v1_steps = w
        .store
        .steps_of_phase(find("prepare", 1).unwrap().id)
        .await
        .unwrap();
    assert!(v1_steps
        .iter()
        .any(|s| s.batch_member_id == u2.id && s.status == StepStatus::Dispatched));
    let superseded_steps = w
        .store
        .steps_of_phase(find("cutover", 1).unwrap().id)
        .await
        .unwrap();
    assert!(superseded_steps.is_empty());
}
