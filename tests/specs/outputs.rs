// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: output params across phases
//!
//! P1's `get-mailbox` declares `output_params { MailboxGuid = "mailboxGuid" }`;
//! P2's `set-guids` references `{{MailboxGuid}}` and must dispatch with the
//! picked value even though the steps live in different phases.

use crate::prelude::*;
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
name = "get-mailbox"
worker_id = "mailbox-worker"
function = "get-mailbox"
[phase.step.params]
User = "{{key}}"
[phase.step.output_params]
MailboxGuid = "mailboxGuid"

[[phase]]
name = "P2"
offset = "T-0"

[[phase.step]]
name = "set-guids"
worker_id = "mailbox-worker"
function = "set-guids"
[phase.step.params]
Guid = "{{MailboxGuid}}"
"#;

#[tokio::test]
async fn outputs_flow_across_phases() {
    let w = World::new().await;
    w.publish_runbook(RUNBOOK).await;
    w.source.set_rows(
        "SELECT * FROM members",
        vec![row(&[("key", "u1"), ("Date", "2030-01-01T10:00:00Z")])],
    );

    // P1 fires an hour early; the worker reports the mailbox guid.
    w.clock.set(at(2030, 1, 1, 9, 0));
    w.tick().await;
    let job = w.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(job.function_name, "get-mailbox");
    w.succeed(&job, json!({"mailboxGuid": "abc"})).await;

    let batch = w
        .store
        .find_batch_by_start_time("rb1", at(2030, 1, 1, 10, 0))
        .await
        .unwrap()
        .unwrap();
    let member = w.store.members_of_batch(batch.id).await.unwrap().remove(0);
    assert_eq!(member.worker_data_json["MailboxGuid"], json!("abc"));

    // P2 fires at T-0 and dispatches with the resolved guid.
    w.clock.set(at(2030, 1, 1, 10, 0));
    w.tick().await;
    let job = w.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(job.function_name, "set-guids");
    assert_eq!(job.parameters["Guid"], "abc");
}
