// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use convoy_core::{Batch, BatchId, BatchMember, BatchStatus, MemberId, RunbookId};
use convoy_runbook::TemplateError;
use serde_json::json;

fn batch(start: Option<&str>) -> Batch {
    Batch {
        id: BatchId::new(7),
        runbook_id: RunbookId::new(1),
        batch_start_time: start.map(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc)
        }),
        status: BatchStatus::Active,
        is_manual: false,
        created_by: None,
        current_phase: None,
        detected_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        init_dispatched_at: None,
    }
}

fn member(data: serde_json::Value, worker: serde_json::Value) -> BatchMember {
    BatchMember {
        id: MemberId::new(3),
        batch_id: BatchId::new(7),
        member_key: "u1".to_string(),
        status: convoy_core::MemberStatus::Active,
        data_json: data,
        worker_data_json: worker,
        added_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        removed_at: None,
        add_dispatched_at: None,
        remove_dispatched_at: None,
    }
}

#[test]
fn member_context_merges_worker_wins_and_overlays_specials() {
    let member = member(
        json!({"Upn": "u1", "Region": "EU"}),
        json!({"Region": "US", "MailboxGuid": "abc"}),
    );
    let batch = batch(Some("2030-01-01T10:00:00Z"));
    let vars = member_context(&member, &batch);

    assert_eq!(vars["Upn"], "u1");
    assert_eq!(vars["Region"], "US");
    assert_eq!(vars["MailboxGuid"], "abc");
    assert_eq!(vars["_batch_id"], "7");
    assert_eq!(vars["_batch_start_time"], "2030-01-01T10:00:00Z");
}

#[test]
fn non_string_values_are_json_encoded() {
    let member = member(json!({"Count": 3, "Tags": ["a", "b"]}), json!({}));
    let vars = member_context(&member, &batch(None));
    assert_eq!(vars["Count"], "3");
    assert_eq!(vars["Tags"], r#"["a","b"]"#);
}

#[test]
fn init_context_has_only_specials() {
    let vars = init_context(&batch(Some("2030-01-01T10:00:00Z")));
    assert_eq!(vars.len(), 2);
    assert_eq!(vars["_batch_id"], "7");
    assert_eq!(vars["_batch_start_time"], "2030-01-01T10:00:00Z");
}

#[test]
fn start_time_special_is_absent_for_undated_manual_batches() {
    let vars = init_context(&batch(None));
    assert!(!vars.contains_key("_batch_start_time"));
}

#[test]
fn resolve_params_reports_missing_names() {
    let params = [
        ("User".to_string(), "{{Upn}}".to_string()),
        ("Guid".to_string(), "{{MailboxGuid}}".to_string()),
    ]
    .into_iter()
    .collect();
    let vars = [("Upn".to_string(), "u1".to_string())].into_iter().collect();

    let err = resolve_params(&params, &vars).unwrap_err();
    let TemplateError::Unresolved { missing, .. } = err;
    assert_eq!(missing, vec!["MailboxGuid".to_string()]);
}

#[test]
fn template_merge_matches_single_pass_resolution() {
    // Resolving against the merged member context equals resolving against
    // a map built in one pass with worker-wins precedence.
    let member = member(json!({"A": "data", "B": "data"}), json!({"B": "worker"}));
    let batch = batch(None);
    let merged = member_context(&member, &batch);

    let mut single_pass = std::collections::HashMap::new();
    single_pass.insert("A".to_string(), "data".to_string());
    single_pass.insert("B".to_string(), "worker".to_string());
    single_pass.insert("_batch_id".to_string(), "7".to_string());

    for key in ["A", "B", "_batch_id"] {
        assert_eq!(merged[key], single_pass[key]);
    }
}
