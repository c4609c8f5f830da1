// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `batch-init` and the sequential init chain

use super::*;
use convoy_core::{BatchStatus, StepStatus};
use convoy_storage::Store;
use serde_json::json;

const INIT_RUNBOOK: &str = r#"
name = "tenant-move"

[data_source]
type = "sql"
connection = "c"
query = "SELECT * FROM tenants"
primary_key = "Tenant"
batch_time_column = "Date"

[[init]]
name = "create-groups"
worker_id = "identity-worker"
function = "create-groups"
[init.params]
Batch = "{{batch_id}}"

[[init]]
name = "stage-dns"
worker_id = "identity-worker"
function = "stage-dns"

[[phase]]
name = "move"
offset = "T-0"

[[phase.step]]
name = "move-tenant"
worker_id = "mailbox-worker"
function = "move-tenant"
"#;

async fn detected_batch(h: &Harness) -> convoy_core::Batch {
    h.publish(INIT_RUNBOOK).await;
    h.source.set_rows(
        "SELECT * FROM tenants",
        vec![convoy_adapters::SourceRow::from_pairs(&[
            ("Tenant", "acme"),
            ("Date", "2030-01-01T10:00:00Z"),
        ])],
    );
    h.tick().await;
    h.store
        .active_batches_for_runbook("tenant-move")
        .await
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn init_chain_dispatches_strictly_sequentially() {
    let h = Harness::new().await;
    let batch = detected_batch(&h).await;
    assert_eq!(batch.status, BatchStatus::InitDispatched);
    assert!(batch.init_dispatched_at.is_some());

    let inits = h.store.inits_of_batch(batch.id, 1).await.unwrap();
    assert_eq!(inits.len(), 2);
    assert_eq!(inits[0].status, StepStatus::Dispatched);
    // Second init waits for the first.
    assert_eq!(inits[1].status, StepStatus::Pending);

    let jobs = h.take_jobs("identity-worker").await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].function_name, "create-groups");
    assert_eq!(jobs[0].job_id.as_str(), format!("init-{}", inits[0].id));
    assert!(jobs[0].correlation_data.is_init_step);
    // {{batch_id}} resolved via the underscore-prefixed special.
    assert_eq!(jobs[0].parameters["Batch"], batch.id.to_string());
}

#[tokio::test]
async fn init_success_advances_chain_then_activates_batch() {
    let h = Harness::new().await;
    let batch = detected_batch(&h).await;
    let first = h.take_jobs("identity-worker").await.remove(0);

    h.succeed(&first, json!({})).await;
    let second = h.take_jobs("identity-worker").await.remove(0);
    assert_eq!(second.function_name, "stage-dns");
    // Still mid-init.
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        BatchStatus::InitDispatched
    );

    h.succeed(&second, json!({})).await;
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        BatchStatus::Active
    );
}

#[tokio::test]
async fn init_failure_fails_the_batch() {
    let h = Harness::new().await;
    let batch = detected_batch(&h).await;
    let first = h.take_jobs("identity-worker").await.remove(0);

    h.fail(&first, "directory unavailable").await;

    let batch = h.store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);
    let inits = h.store.inits_of_batch(batch.id, 1).await.unwrap();
    assert_eq!(inits[0].status, StepStatus::Failed);
    assert_eq!(
        inits[0].error_message.as_deref(),
        Some("directory unavailable")
    );
    // The second init was never started.
    assert_eq!(inits[1].status, StepStatus::Pending);
}

#[tokio::test]
async fn replayed_batch_init_creates_no_duplicate_rows() {
    let h = Harness::new().await;
    let batch = detected_batch(&h).await;
    // Drain the first dispatch so only replay effects remain visible.
    assert_eq!(h.take_jobs("identity-worker").await.len(), 1);

    // Scheduler re-publishes batch-init on redelivery; handlers must be
    // idempotent.
    let event = convoy_core::OrchestratorEvent::BatchInit(convoy_core::BatchInitMsg {
        runbook_name: "tenant-move".to_string(),
        runbook_version: 1,
        batch_id: batch.id,
        batch_start_time: batch.batch_start_time,
        member_count: 1,
    });
    h.orchestrator.handle_event(event.clone()).await.unwrap();
    h.orchestrator.handle_event(event).await.unwrap();

    let inits = h.store.inits_of_batch(batch.id, 1).await.unwrap();
    assert_eq!(inits.len(), 2);
    // The in-flight init was not double-dispatched: the deterministic job
    // id suppressed the duplicate.
    assert!(h.take_jobs("identity-worker").await.is_empty());
}

#[tokio::test]
async fn runbook_without_init_goes_straight_to_active() {
    let h = Harness::new().await;
    h.publish(TWO_PHASE_RUNBOOK).await;
    h.source
        .set_rows("SELECT * FROM moves", vec![move_row("u1", "2030-01-01T10:00:00Z")]);
    h.tick().await;

    let batch = h
        .store
        .active_batches_for_runbook("mailbox-move")
        .await
        .unwrap()
        .remove(0);
    assert_eq!(batch.status, BatchStatus::Active);
    assert!(h.store.inits_of_batch(batch.id, 1).await.unwrap().is_empty());
}
