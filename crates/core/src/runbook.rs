// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook version rows and automation settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

crate::define_int_id! {
    /// Identifier of one persisted runbook *version* row.
    pub struct RunbookId;
}

/// Policy for phases that are already past due when a version transition
/// creates their new-version rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverdueBehavior {
    /// Create the row `pending`; the next tick dispatches it.
    Rerun,
    /// Create the row already `skipped`.
    Ignore,
}

impl std::fmt::Display for OverdueBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverdueBehavior::Rerun => write!(f, "rerun"),
            OverdueBehavior::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for OverdueBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rerun" => Ok(OverdueBehavior::Rerun),
            "ignore" => Ok(OverdueBehavior::Ignore),
            other => Err(format!("unknown overdue behavior: {}", other)),
        }
    }
}

/// One version of a named runbook.
///
/// Versions are monotone per name; at most one row per name is active.
/// Publishing version N deactivates every version < N.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    pub id: RunbookId,
    pub name: String,
    pub version: i32,
    /// The full declarative document text, as published.
    pub document: String,
    /// Stable across versions of the same name; owned by the query layer.
    pub data_table_name: String,
    pub is_active: bool,
    pub overdue_behavior: OverdueBehavior,
    pub rerun_init: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-runbook-name automation toggle with audit fields.
///
/// Keyed by name (not version id) so a toggle survives republishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSetting {
    pub runbook_name: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}
