// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch rows and the batch status state machine

use crate::runbook::RunbookId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

crate::define_int_id! {
    /// Identifier of a batch row.
    pub struct BatchId;
}

/// Lifecycle status of a batch.
///
/// `completed` and `failed` are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Detected,
    InitDispatched,
    Active,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, to),
            (Detected, InitDispatched)
                | (Detected, Active)
                | (Detected, Failed)
                | (InitDispatched, Active)
                | (InitDispatched, Failed)
                | (Active, Completed)
                | (Active, Failed)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Detected => write!(f, "detected"),
            BatchStatus::InitDispatched => write!(f, "init_dispatched"),
            BatchStatus::Active => write!(f, "active"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(BatchStatus::Detected),
            "init_dispatched" => Ok(BatchStatus::InitDispatched),
            "active" => Ok(BatchStatus::Active),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status: {}", other)),
        }
    }
}

/// One discovered (or manually created) group of members of a runbook.
///
/// `runbook_id` points at the specific version the batch was detected
/// under; scheduled batches are looked up by `(runbook_name,
/// batch_start_time)` so republishing a runbook does not re-detect them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub runbook_id: RunbookId,
    /// Null until a manual batch is advanced.
    pub batch_start_time: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub is_manual: bool,
    pub created_by: Option<String>,
    pub current_phase: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub init_dispatched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
