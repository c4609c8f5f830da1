// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase row planning: initial creation and version-transition deltas

use chrono::{DateTime, Duration, Utc};
use convoy_core::{Batch, OverdueBehavior, PhaseExecution, PhaseExecutionId, PhaseStatus};
use convoy_runbook::{parse_offset, RunbookDef};
use convoy_storage::NewPhaseExecution;

/// Due time for a phase: `batch_start_time − offset_minutes`.
fn due_at(start: Option<DateTime<Utc>>, offset_minutes: i64) -> Option<DateTime<Utc>> {
    start.map(|s| s - Duration::minutes(offset_minutes))
}

/// Initial phase rows for a freshly detected batch: one pending row per
/// phase of the document, stamped with the detecting version.
///
/// Offsets were validated at publish time; a document that stopped
/// parsing is skipped upstream, so unparseable offsets fall back to 0.
pub fn phase_rows_for_batch(
    def: &RunbookDef,
    runbook_version: i32,
    batch: &Batch,
) -> Vec<NewPhaseExecution> {
    def.phases
        .iter()
        .map(|phase| {
            let offset_minutes = parse_offset(&phase.offset).map(|o| o.minutes).unwrap_or(0);
            NewPhaseExecution {
                batch_id: batch.id,
                phase_name: phase.name.clone(),
                offset_minutes,
                due_at: due_at(batch.batch_start_time, offset_minutes),
                runbook_version,
                status: PhaseStatus::Pending,
            }
        })
        .collect()
}

/// Delta applied to an in-flight batch when a newer runbook version is
/// published.
#[derive(Debug, Default)]
pub struct VersionTransition {
    /// New-version rows to insert: `pending`, or already `skipped` when
    /// past due under `overdue_behavior = ignore`.
    pub new_rows: Vec<NewPhaseExecution>,
    /// Prior-version `pending` rows to supersede.
    pub supersede: Vec<PhaseExecutionId>,
}

/// Compute the version-transition delta for one batch.
///
/// Every phase of the new document gets a row tagged with the new
/// version unless one already exists; prior-version pending rows are
/// superseded. Rows already past due come out `skipped` when the runbook
/// says overdue phases are ignored, otherwise `pending` so the scheduler
/// re-runs them.
pub fn version_transition(
    def: &RunbookDef,
    new_version: i32,
    batch: &Batch,
    existing: &[PhaseExecution],
    overdue_behavior: OverdueBehavior,
    now: DateTime<Utc>,
) -> VersionTransition {
    let mut delta = VersionTransition::default();

    for phase in &def.phases {
        let already = existing
            .iter()
            .any(|p| p.runbook_version == new_version && p.phase_name == phase.name);
        if already {
            continue;
        }
        let offset_minutes = parse_offset(&phase.offset).map(|o| o.minutes).unwrap_or(0);
        let due = due_at(batch.batch_start_time, offset_minutes);
        let past_due = due.map(|d| d <= now).unwrap_or(false);
        let status = if past_due && overdue_behavior == OverdueBehavior::Ignore {
            PhaseStatus::Skipped
        } else {
            PhaseStatus::Pending
        };
        delta.new_rows.push(NewPhaseExecution {
            batch_id: batch.id,
            phase_name: phase.name.clone(),
            offset_minutes,
            due_at: due,
            runbook_version: new_version,
            status,
        });
    }

    delta.supersede = existing
        .iter()
        .filter(|p| p.runbook_version < new_version && p.status == PhaseStatus::Pending)
        .map(|p| p.id)
        .collect();

    delta
}

#[cfg(test)]
#[path = "phases_tests.rs"]
mod tests;
