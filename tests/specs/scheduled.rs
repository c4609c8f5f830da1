// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: scheduled happy path
//!
//! A runbook batching by a date column, with phases at T-1h and T-0.
//! Detection creates the batch and its dated phase rows; a tick at 09:05
//! fires the T-1h phase only, and the full run completes the batch.

use crate::prelude::*;
use convoy_core::{BatchStatus, PhaseStatus, StepStatus};
use convoy_storage::Store;
use serde_json::json;

const RUNBOOK: &str = r#"
name = "rb1"

[data_source]
type = "sql"
connection = "src"
query = "SELECT * FROM members"
primary_key = "key"
batch_time_column = "Date"

[[phase]]
name = "P1"
offset = "T-1h"

[[phase.step]]
name = "S"
worker_id = "mailbox-worker"
function = "prepare"
[phase.step.params]
User = "{{key}}"

[[phase]]
name = "P2"
offset = "T-0"

[[phase.step]]
name = "S"
worker_id = "mailbox-worker"
function = "cutover"
[phase.step.params]
User = "{{key}}"
"#;

#[tokio::test]
async fn scheduled_happy_path() {
    let w = World::new().await;
    w.publish_runbook(RUNBOOK).await;
    w.source.set_rows(
        "SELECT * FROM members",
        vec![row(&[("key", "u1"), ("Date", "2030-01-01T10:00:00Z")])],
    );

    // Detection tick: batch exists with both phase rows dated.
    w.tick().await;
    let batch = w
        .store
        .find_batch_by_start_time("rb1", at(2030, 1, 1, 10, 0))
        .await
        .unwrap()
        .expect("batch detected");
    assert_eq!(batch.batch_start_time, Some(at(2030, 1, 1, 10, 0)));

    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(phases.len(), 2);
    let p1 = phases.iter().find(|p| p.phase_name == "P1").unwrap();
    let p2 = phases.iter().find(|p| p.phase_name == "P2").unwrap();
    assert_eq!(p1.due_at, Some(at(2030, 1, 1, 9, 0)));
    assert_eq!(p2.due_at, Some(at(2030, 1, 1, 10, 0)));

    // 09:05: P1 fires, P2 does not.
    w.clock.set(at(2030, 1, 1, 9, 5));
    w.tick().await;
    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(
        phases.iter().find(|p| p.phase_name == "P1").unwrap().status,
        PhaseStatus::Dispatched
    );
    assert_eq!(
        phases.iter().find(|p| p.phase_name == "P2").unwrap().status,
        PhaseStatus::Pending
    );

    let jobs = w.take_jobs("mailbox-worker").await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].function_name, "prepare");
    assert_eq!(jobs[0].parameters["User"], "u1");
    w.succeed(&jobs[0], json!({})).await;

    // 10:00: P2 fires and completes; the batch completes with it.
    w.clock.set(at(2030, 1, 1, 10, 0));
    w.tick().await;
    let cutover = w.take_jobs("mailbox-worker").await;
    assert_eq!(cutover.len(), 1);
    assert_eq!(cutover[0].function_name, "cutover");
    w.succeed(&cutover[0], json!({})).await;

    let batch = w.store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Completed));

    for phase in &phases {
        for step in w.store.steps_of_phase(phase.id).await.unwrap() {
            assert_eq!(step.status, StepStatus::Succeeded);
        }
    }
}
