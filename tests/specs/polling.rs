// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: polling with timeout
//!
//! A polling step reporting `{complete: false}` every five minutes runs
//! out of its one-hour budget and expires to `poll_timeout` with no retry.

use crate::prelude::*;
use chrono::Duration;
use convoy_core::{MemberStatus, StepStatus};
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
[phase.step.poll]
interval = "5m"
timeout = "1h"
[phase.step.retry]
max_retries = 3
interval = "30s"
"#;

#[tokio::test]
async fn polling_runs_out_the_clock() {
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
    w.poll_response(&job, false, None).await;

    let phases = w.store.phases_of_batch(batch.id).await.unwrap();
    let step = w.store.steps_of_phase(phases[0].id).await.unwrap().remove(0);
    assert_eq!(step.status, StepStatus::Polling);

    // The worker keeps reporting in-progress at every poll.
    let mut expired = false;
    for _ in 0..14 {
        w.clock.advance(Duration::minutes(5));
        w.drain().await;
        let current = w.store.steps_of_phase(phases[0].id).await.unwrap().remove(0);
        if current.status == StepStatus::PollTimeout {
            expired = true;
            break;
        }
        for poll in w.take_jobs("mailbox-worker").await {
            assert!(poll.is_poll_call);
            w.poll_response(&poll, false, None).await;
        }
    }
    assert!(expired, "step should have expired inside the loop");

    let step = w.store.steps_of_phase(phases[0].id).await.unwrap().remove(0);
    assert_eq!(step.status, StepStatus::PollTimeout);
    // An hour of five-minute polls elapsed before expiry.
    assert!(step.poll_count >= 11);
    // Poll timeout does not trigger retry, even with retry configured.
    assert_eq!(step.retry_count, 0);

    let member = w.store.members_of_batch(batch.id).await.unwrap().remove(0);
    assert_eq!(member.status, MemberStatus::Failed);
}
