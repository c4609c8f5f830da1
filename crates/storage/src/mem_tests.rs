// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::{
    NewBatch, NewInitExecution, NewMember, NewPhaseExecution, NewRunbook, NewStepExecution,
};
use chrono::TimeZone;
use convoy_core::OverdueBehavior;
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
}

fn new_runbook(name: &str) -> NewRunbook {
    NewRunbook {
        name: name.to_string(),
        document: "name = \"rb\"".to_string(),
        data_table_name: format!("{name}_data"),
        overdue_behavior: OverdueBehavior::Rerun,
        rerun_init: false,
    }
}

async fn batch_for(store: &MemStore, runbook_id: RunbookId) -> Batch {
    store
        .insert_batch(
            NewBatch {
                runbook_id,
                batch_start_time: Some(now()),
                status: BatchStatus::Active,
                is_manual: false,
                created_by: None,
            },
            now(),
        )
        .await
        .unwrap()
}

fn new_step(phase: PhaseExecutionId, member: MemberId, index: i32) -> NewStepExecution {
    NewStepExecution {
        phase_execution_id: phase,
        batch_member_id: member,
        step_name: format!("step-{index}"),
        step_index: index,
        worker_id: "mailbox-worker".to_string(),
        function_name: "fn".to_string(),
        params_json: HashMap::new(),
        is_poll_step: false,
        poll_interval_secs: None,
        poll_timeout_secs: None,
        on_failure: None,
        max_retries: 0,
        retry_interval_secs: 0,
    }
}

#[tokio::test]
async fn publishing_keeps_one_active_version_per_name() {
    let store = MemStore::new();
    let v1 = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    assert_eq!(v1.version, 1);
    assert!(v1.is_active);

    let v2 = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    assert_eq!(v2.version, 2);

    let active = store.list_active_runbooks().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version, 2);

    // Old version still fetchable by explicit version.
    let old = store.get_runbook_by_name("rb1", Some(1)).await.unwrap().unwrap();
    assert!(!old.is_active);
}

#[tokio::test]
async fn member_keys_are_unique_per_batch() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;

    let first = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({"Name": "A"}),
            },
            now(),
        )
        .await
        .unwrap();
    assert!(first.is_some());

    let duplicate = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({"Name": "B"}),
            },
            now(),
        )
        .await
        .unwrap();
    assert!(duplicate.is_none());
}

#[tokio::test]
async fn cas_only_wins_from_expected_status() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;

    assert!(store
        .cas_batch_status(batch.id, BatchStatus::Active, BatchStatus::Completed, now())
        .await
        .unwrap());
    // Second writer loses the race.
    assert!(!store
        .cas_batch_status(batch.id, BatchStatus::Active, BatchStatus::Failed, now())
        .await
        .unwrap());
}

#[tokio::test]
async fn worker_data_merge_new_keys_win() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;
    let member = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({"Region": "EU"}),
            },
            now(),
        )
        .await
        .unwrap()
        .unwrap();

    let mut first = serde_json::Map::new();
    first.insert("MailboxGuid".to_string(), json!("old"));
    store.merge_worker_data(member.id, first).await.unwrap();

    let mut second = serde_json::Map::new();
    second.insert("MailboxGuid".to_string(), json!("new"));
    second.insert("ArchiveGuid".to_string(), json!("arc"));
    store.merge_worker_data(member.id, second).await.unwrap();

    let member = store.get_member(member.id).await.unwrap().unwrap();
    assert_eq!(member.worker_data_json["MailboxGuid"], json!("new"));
    assert_eq!(member.worker_data_json["ArchiveGuid"], json!("arc"));
    // Frozen snapshot untouched.
    assert_eq!(member.data_json, json!({"Region": "EU"}));
}

#[tokio::test]
async fn step_insert_is_idempotent_per_phase_member_index() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;
    let member = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({}),
            },
            now(),
        )
        .await
        .unwrap()
        .unwrap();
    let phase = store
        .insert_phase_execution(
            NewPhaseExecution {
                batch_id: batch.id,
                phase_name: "p1".to_string(),
                offset_minutes: 0,
                due_at: Some(now()),
                runbook_version: 1,
                status: PhaseStatus::Pending,
            },
            now(),
        )
        .await
        .unwrap();

    let rows = vec![
        new_step(phase.id, member.id, 0),
        new_step(phase.id, member.id, 1),
    ];
    assert_eq!(
        store.insert_step_executions(rows.clone(), now()).await.unwrap(),
        2
    );
    // Replay inserts nothing.
    assert_eq!(store.insert_step_executions(rows, now()).await.unwrap(), 0);
}

#[tokio::test]
async fn init_insert_skips_whole_batch_when_any_row_exists() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;

    let make = |index: i32| NewInitExecution {
        batch_id: batch.id,
        runbook_version: 1,
        step_name: format!("init-{index}"),
        step_index: index,
        worker_id: "identity-worker".to_string(),
        function_name: "fn".to_string(),
        params_json: HashMap::new(),
        is_poll_step: false,
        poll_interval_secs: None,
        poll_timeout_secs: None,
        on_failure: None,
        max_retries: 0,
        retry_interval_secs: 0,
    };

    assert_eq!(
        store
            .insert_init_executions(vec![make(0), make(1)], now())
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        store
            .insert_init_executions(vec![make(0), make(1)], now())
            .await
            .unwrap(),
        0
    );
    // A new runbook version gets fresh rows.
    let mut v2 = make(0);
    v2.runbook_version = 2;
    assert_eq!(
        store.insert_init_executions(vec![v2], now()).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn retry_bookkeeping_bumps_count_and_returns_to_pending() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;
    let member = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({}),
            },
            now(),
        )
        .await
        .unwrap()
        .unwrap();
    let phase = store
        .insert_phase_execution(
            NewPhaseExecution {
                batch_id: batch.id,
                phase_name: "p1".to_string(),
                offset_minutes: 0,
                due_at: Some(now()),
                runbook_version: 1,
                status: PhaseStatus::Pending,
            },
            now(),
        )
        .await
        .unwrap();
    store
        .insert_step_executions(vec![new_step(phase.id, member.id, 0)], now())
        .await
        .unwrap();
    let step = store.steps_of_phase(phase.id).await.unwrap().remove(0);

    assert!(store
        .mark_step_dispatched(
            step.id,
            StepStatus::Pending,
            &JobId::step(step.id, 0),
            HashMap::new(),
            now(),
        )
        .await
        .unwrap());

    let retry_after = now() + chrono::Duration::seconds(30);
    assert!(store
        .step_retry_bookkeeping(step.id, StepStatus::Dispatched, retry_after, now())
        .await
        .unwrap());

    let step = store.get_step_execution(step.id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Pending);
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.retry_after, Some(retry_after));
}

#[tokio::test]
async fn poll_bookkeeping_sets_started_once_and_counts() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;
    let member = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({}),
            },
            now(),
        )
        .await
        .unwrap()
        .unwrap();
    let phase = store
        .insert_phase_execution(
            NewPhaseExecution {
                batch_id: batch.id,
                phase_name: "p1".to_string(),
                offset_minutes: 0,
                due_at: Some(now()),
                runbook_version: 1,
                status: PhaseStatus::Pending,
            },
            now(),
        )
        .await
        .unwrap();
    store
        .insert_step_executions(vec![new_step(phase.id, member.id, 0)], now())
        .await
        .unwrap();
    let step = store.steps_of_phase(phase.id).await.unwrap().remove(0);
    store
        .mark_step_dispatched(
            step.id,
            StepStatus::Pending,
            &JobId::step(step.id, 0),
            HashMap::new(),
            now(),
        )
        .await
        .unwrap();

    let t0 = now();
    assert!(store
        .step_poll_bookkeeping(step.id, StepStatus::Dispatched, t0)
        .await
        .unwrap());
    let t1 = t0 + chrono::Duration::minutes(5);
    assert!(store
        .step_poll_bookkeeping(step.id, StepStatus::Polling, t1)
        .await
        .unwrap());

    let step = store.get_step_execution(step.id).await.unwrap().unwrap();
    assert_eq!(step.status, StepStatus::Polling);
    assert_eq!(step.poll_started_at, Some(t0));
    assert_eq!(step.last_polled_at, Some(t1));
    assert_eq!(step.poll_count, 2);
}

#[tokio::test]
async fn removed_member_can_reappear() {
    let store = MemStore::new();
    let rb = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, rb.id).await;
    let member = store
        .insert_member(
            NewMember {
                batch_id: batch.id,
                member_key: "u1".to_string(),
                data_json: json!({}),
            },
            now(),
        )
        .await
        .unwrap()
        .unwrap();

    store.mark_member_add_dispatched(member.id, now()).await.unwrap();
    assert!(store
        .cas_member_status(member.id, MemberStatus::Active, MemberStatus::Removed, now())
        .await
        .unwrap());
    let removed = store.get_member(member.id).await.unwrap().unwrap();
    assert_eq!(removed.removed_at, Some(now()));

    assert!(store
        .cas_member_status(member.id, MemberStatus::Removed, MemberStatus::Active, now())
        .await
        .unwrap());
    let restored = store.get_member(member.id).await.unwrap().unwrap();
    assert!(restored.removed_at.is_none());
    // Cleared so the next tick re-publishes member-added.
    assert!(restored.add_dispatched_at.is_none());
}

#[tokio::test]
async fn find_batch_by_start_time_crosses_versions() {
    let store = MemStore::new();
    let v1 = store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let batch = batch_for(&store, v1.id).await;

    // Republish: batch still found by name + start time.
    store.publish_runbook(new_runbook("rb1"), now()).await.unwrap();
    let found = store
        .find_batch_by_start_time("rb1", now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, batch.id);
}
