// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: retry then failure
//!
//! One retry at a 30-second interval; when the second attempt also fails
//! the step, member, phase, and batch all end failed.

use crate::prelude::*;
use chrono::Duration;
use convoy_core::{BatchStatus, MemberStatus, PhaseStatus, StepStatus};
use convoy_storage::Store;

const RUNBOOK: &str = r#"
name = "rb1"

[data_source]
type = "sql"
connection = "src"
query = "SELECT * FROM members"
primary_key = "key"
batch_time_column = "Date"

[[phase]]
name = "P"
offset = "T-0"

[[phase.step]]
name = "S"
worker_id = "mailbox-worker"
function = "sync"
[phase.step.retry]
max_retries = 1
interval = "30s"
"#;

#[tokio::test]
async fn retry_then_terminal_failure() {
    let w = World::new().await;
    w.publish_runbook(RUNBOOK).await;
    w.source.set_rows(
        "SELECT * FROM members",
        vec![row(&[("key", "u1"), ("Date", "2030-01-01T10:00:00Z")])],
    );
    w.clock.set(at(2030, 1, 1, 10, 0));
    w.tick().await;

    let batch = w
        .store
        .find_batch_by_start_time("rb1", at(2030, 1, 1, 10, 0))
        .await
        .unwrap()
        .unwrap();
    let job = w.take_jobs("mailbox-worker").await.remove(0);

    // First failure: retry scheduled, nothing dispatched yet.
    w.fail(&job, "mailbox locked").await;
    assert!(w.take_jobs("mailbox-worker").await.is_empty());

    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    let step = w.store.steps_of_phase(phases[0].id).await.unwrap().remove(0);
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(step.retry_count, 1);

    // The scheduled retry-check fires after 30s and redispatches.
    w.clock.advance(Duration::seconds(30));
    w.drain().await;
    let retry = w.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(retry.job_id.as_str(), format!("step-{}-retry-1", step.id));

    // Second failure exhausts retries.
    w.fail(&retry, "mailbox still locked").await;

    let step = w.store.steps_of_phase(phases[0].id).await.unwrap().remove(0);
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error_message.as_deref(), Some("mailbox still locked"));

    let member = w.store.members_of_batch(batch.id).await.unwrap().remove(0);
    assert_eq!(member.status, MemberStatus::Failed);
    let phase = w
        .store
        .get_phase_execution(phases[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(phase.status, PhaseStatus::Failed);
    let batch = w.store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);
}
