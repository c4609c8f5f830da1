// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{Harness, TWO_PHASE_RUNBOOK};
use crate::EngineError;
use convoy_core::{BatchStatus, MemberStatus, PhaseStatus, StepStatus};
use convoy_runbook::Format;
use convoy_core::OverdueBehavior;
use convoy_storage::{BatchFilter, Page, Store};
use serde_json::json;
use std::collections::HashMap;

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

[[phase]]
name = "move"
offset = "T-1h"

[[phase.step]]
name = "move-tenant"
worker_id = "mailbox-worker"
function = "move-tenant"
[phase.step.params]
Tenant = "{{Tenant}}"
"#;

fn row(key: &str, value: &str) -> HashMap<String, String> {
    [(key.to_string(), value.to_string())].into_iter().collect()
}

#[tokio::test]
async fn invalid_document_publishes_nothing() {
    let h = Harness::new().await;
    let err = h
        .admin
        .publish_runbook("name = \"rb\"", Format::Toml, OverdueBehavior::Rerun, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(h.admin.list_active_runbooks().await.unwrap().is_empty());
}

#[tokio::test]
async fn republish_bumps_version_and_keeps_table_name() {
    let h = Harness::new().await;
    let v1 = h.publish(TWO_PHASE_RUNBOOK).await;
    let v2 = h.publish(TWO_PHASE_RUNBOOK).await;

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_eq!(v1.data_table_name, v2.data_table_name);
    let versions = h.admin.list_runbook_versions("mailbox-move").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert!(!versions[0].is_active);
    assert!(versions[1].is_active);
}

#[tokio::test]
async fn manual_batch_lifecycle_detected_init_active_phase() {
    let h = Harness::new().await;
    h.publish(INIT_RUNBOOK).await;

    let batch = h
        .admin
        .create_manual_batch("tenant-move", vec![row("Tenant", "acme")], "operator")
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Detected);
    assert!(batch.is_manual);
    assert!(batch.batch_start_time.is_none());
    assert_eq!(batch.created_by.as_deref(), Some("operator"));

    // Phases exist but are undated until the batch is advanced.
    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(phases.len(), 1);
    assert!(phases[0].due_at.is_none());

    // First advance: stamps the start time and dispatches init.
    h.admin.advance_batch(batch.id).await.unwrap();
    h.pump().await;
    let advanced = h.store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(advanced.status, BatchStatus::InitDispatched);
    assert!(advanced.batch_start_time.is_some());

    let init_job = h.take_jobs("identity-worker").await.remove(0);
    h.succeed(&init_job, json!({})).await;
    assert_eq!(
        h.store.get_batch(batch.id).await.unwrap().unwrap().status,
        BatchStatus::Active
    );

    // Second advance: fires the pending phase regardless of due time.
    h.admin.advance_batch(batch.id).await.unwrap();
    h.pump().await;
    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(phases[0].status, PhaseStatus::Dispatched);
    let job = h.take_jobs("mailbox-worker").await.remove(0);
    assert_eq!(job.parameters["Tenant"], "acme");
}

#[tokio::test]
async fn advance_rejects_scheduled_batches() {
    let h = Harness::new().await;
    h.publish(TWO_PHASE_RUNBOOK).await;
    h.source.set_rows(
        "SELECT * FROM moves",
        vec![crate::test_helpers::move_row("u1", "2030-01-01T10:00:00Z")],
    );
    h.tick().await;
    let batch = h
        .store
        .active_batches_for_runbook("mailbox-move")
        .await
        .unwrap()
        .remove(0);

    let err = h.admin.advance_batch(batch.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
}

#[tokio::test]
async fn cancel_batch_cancels_steps_and_fails_batch() {
    let h = Harness::new().await;
    h.publish(INIT_RUNBOOK).await;
    let batch = h
        .admin
        .create_manual_batch("tenant-move", vec![row("Tenant", "acme")], "operator")
        .await
        .unwrap();
    h.admin.advance_batch(batch.id).await.unwrap();
    h.pump().await;

    h.admin.cancel_batch(batch.id).await.unwrap();

    let cancelled = h.store.get_batch(batch.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, BatchStatus::Failed);
    let phases = h.store.phases_of_batch(batch.id).await.unwrap();
    assert_eq!(phases[0].status, PhaseStatus::Skipped);
    let inits = h.store.inits_of_batch(batch.id, 1).await.unwrap();
    assert_eq!(inits[0].status, StepStatus::Cancelled);

    // Terminal batches reject further admin verbs.
    assert!(h.admin.advance_batch(batch.id).await.is_err());
    assert!(h.admin.cancel_batch(batch.id).await.is_err());
}

#[tokio::test]
async fn member_add_and_remove_round_trip() {
    let h = Harness::new().await;
    h.publish(INIT_RUNBOOK).await;
    let batch = h
        .admin
        .create_manual_batch("tenant-move", vec![row("Tenant", "acme")], "operator")
        .await
        .unwrap();

    let member = h
        .admin
        .add_member(batch.id, row("Tenant", "globex"))
        .await
        .unwrap();
    h.pump().await;
    assert_eq!(member.member_key, "globex");

    // Duplicate key is rejected.
    assert!(h.admin.add_member(batch.id, row("Tenant", "globex")).await.is_err());
    // Payload must carry the primary key column.
    assert!(h.admin.add_member(batch.id, row("Name", "x")).await.is_err());

    h.admin.remove_member(batch.id, member.id).await.unwrap();
    h.pump().await;
    let members = h.admin.list_members(batch.id).await.unwrap();
    let removed = members.iter().find(|m| m.id == member.id).unwrap();
    assert_eq!(removed.status, MemberStatus::Removed);

    // Removing again is invalid.
    assert!(h.admin.remove_member(batch.id, member.id).await.is_err());
}

#[tokio::test]
async fn batch_listing_filters_and_paginates() {
    let h = Harness::new().await;
    h.publish(INIT_RUNBOOK).await;
    for i in 0..3 {
        h.admin
            .create_manual_batch("tenant-move", vec![row("Tenant", &format!("t{i}"))], "op")
            .await
            .unwrap();
    }

    let all = h
        .admin
        .list_batches(BatchFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let manual_only = h
        .admin
        .list_batches(
            BatchFilter {
                runbook_name: Some("tenant-move".to_string()),
                status: Some(BatchStatus::Detected),
                is_manual: Some(true),
            },
            Page { limit: 2, offset: 0 },
        )
        .await
        .unwrap();
    assert_eq!(manual_only.len(), 2);
    // Newest first.
    assert!(manual_only[0].id > manual_only[1].id);
}
