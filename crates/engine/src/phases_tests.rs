// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use convoy_core::{
    Batch, BatchId, BatchStatus, OverdueBehavior, PhaseExecution, PhaseExecutionId, PhaseStatus,
    RunbookId,
};
use convoy_runbook::parse_runbook;

const DOC: &str = r#"
name = "rb1"

[data_source]
type = "sql"
connection = "c"
query = "q"
primary_key = "k"
batch_time_column = "Date"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "s1"
worker_id = "w"
function = "f"

[[phase]]
name = "cutover"
offset = "T-0"

[[phase.step]]
name = "s2"
worker_id = "w"
function = "f"
"#;

fn batch(start: Option<&str>) -> Batch {
    Batch {
        id: BatchId::new(1),
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

fn existing(
    id: i64,
    name: &str,
    version: i32,
    status: PhaseStatus,
) -> PhaseExecution {
    PhaseExecution {
        id: PhaseExecutionId::new(id),
        batch_id: BatchId::new(1),
        phase_name: name.to_string(),
        offset_minutes: 0,
        due_at: None,
        runbook_version: version,
        status,
        created_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        dispatched_at: None,
        completed_at: None,
    }
}

#[test]
fn initial_rows_compute_due_from_start_minus_offset() {
    let def = parse_runbook(DOC).unwrap();
    let rows = phase_rows_for_batch(&def, 1, &batch(Some("2030-01-01T10:00:00Z")));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].phase_name, "prepare");
    assert_eq!(rows[0].offset_minutes, 60);
    assert_eq!(
        rows[0].due_at,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap())
    );
    // T-0 is due exactly at batch start.
    assert_eq!(rows[1].offset_minutes, 0);
    assert_eq!(
        rows[1].due_at,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap())
    );
    assert!(rows.iter().all(|r| r.status == PhaseStatus::Pending));
    assert!(rows.iter().all(|r| r.runbook_version == 1));
}

#[test]
fn manual_batches_get_undated_rows() {
    let def = parse_runbook(DOC).unwrap();
    let rows = phase_rows_for_batch(&def, 1, &batch(None));
    assert!(rows.iter().all(|r| r.due_at.is_none()));
}

#[test]
fn transition_supersedes_old_pending_only() {
    let def = parse_runbook(DOC).unwrap();
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 9, 30, 0).unwrap();
    let existing = vec![
        existing(10, "prepare", 1, PhaseStatus::Dispatched),
        existing(11, "cutover", 1, PhaseStatus::Pending),
    ];

    let delta = version_transition(
        &def,
        2,
        &batch(Some("2030-01-01T10:00:00Z")),
        &existing,
        OverdueBehavior::Rerun,
        now,
    );

    assert_eq!(delta.supersede, vec![PhaseExecutionId::new(11)]);
    assert_eq!(delta.new_rows.len(), 2);
    assert!(delta.new_rows.iter().all(|r| r.runbook_version == 2));
    // prepare is past due (09:00 <= 09:30) but rerun keeps it pending.
    assert!(delta.new_rows.iter().all(|r| r.status == PhaseStatus::Pending));
}

#[test]
fn transition_with_ignore_skips_past_due_rows() {
    let def = parse_runbook(DOC).unwrap();
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 9, 30, 0).unwrap();

    let delta = version_transition(
        &def,
        2,
        &batch(Some("2030-01-01T10:00:00Z")),
        &[],
        OverdueBehavior::Ignore,
        now,
    );

    let prepare = delta
        .new_rows
        .iter()
        .find(|r| r.phase_name == "prepare")
        .unwrap();
    assert_eq!(prepare.status, PhaseStatus::Skipped);
    let cutover = delta
        .new_rows
        .iter()
        .find(|r| r.phase_name == "cutover")
        .unwrap();
    assert_eq!(cutover.status, PhaseStatus::Pending);
}

#[test]
fn transition_is_idempotent_once_rows_exist() {
    let def = parse_runbook(DOC).unwrap();
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap();
    let existing = vec![
        existing(10, "prepare", 2, PhaseStatus::Pending),
        existing(11, "cutover", 2, PhaseStatus::Pending),
    ];

    let delta = version_transition(
        &def,
        2,
        &batch(Some("2030-01-01T10:00:00Z")),
        &existing,
        OverdueBehavior::Rerun,
        now,
    );
    assert!(delta.new_rows.is_empty());
    assert!(delta.supersede.is_empty());
}
