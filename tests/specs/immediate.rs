// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: immediate batching
//!
//! Rows seen at 12:02 land in the 12:00 bucket; a new member first seen
//! at 12:07 joins a fresh 12:05 bucket instead of the existing batch.

use crate::prelude::*;
use convoy_storage::Store;

const RUNBOOK: &str = r#"
name = "joiners"

[data_source]
type = "sql"
connection = "src"
query = "SELECT * FROM joiners"
primary_key = "key"
batch_time = "immediate"

[[phase]]
name = "provision"
offset = "T-0"

[[phase.step]]
name = "provision"
worker_id = "identity-worker"
function = "provision"
"#;

#[tokio::test]
async fn immediate_bucketing() {
    let w = World::new().await;
    w.publish_runbook(RUNBOOK).await;

    w.clock.set(at(2030, 1, 1, 12, 2));
    w.source
        .set_rows("SELECT * FROM joiners", vec![row(&[("key", "u1")])]);
    w.tick().await;

    let first = w
        .store
        .find_batch_by_start_time("joiners", at(2030, 1, 1, 12, 0))
        .await
        .unwrap()
        .expect("12:00 bucket");
    let members = w.store.members_of_batch(first.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].member_key, "u1");

    w.clock.set(at(2030, 1, 1, 12, 7));
    w.source.set_rows(
        "SELECT * FROM joiners",
        vec![row(&[("key", "u1")]), row(&[("key", "u2")])],
    );
    w.tick().await;

    let second = w
        .store
        .find_batch_by_start_time("joiners", at(2030, 1, 1, 12, 5))
        .await
        .unwrap()
        .expect("12:05 bucket");
    let members = w.store.members_of_batch(second.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].member_key, "u2");

    // u1 stayed where it was.
    let members = w.store.members_of_batch(first.id).await.unwrap();
    assert_eq!(members.len(), 1);

    // Both batches dispatched their phase at detection.
    let jobs = w.take_jobs("identity-worker").await;
    assert_eq!(jobs.len(), 2);
}
