// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch member rows

use crate::batch::BatchId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

crate::define_int_id! {
    /// Identifier of a batch member row.
    pub struct MemberId;
}

/// Lifecycle status of a member within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Removed,
    Failed,
}

impl MemberStatus {
    /// Whether `self → to` is a legal transition.
    ///
    /// `removed → active` covers a member key that disappears from the
    /// source and later reappears; `failed` is a sink.
    pub fn can_transition(&self, to: MemberStatus) -> bool {
        use MemberStatus::*;
        matches!(
            (self, to),
            (Active, Removed) | (Active, Failed) | (Removed, Active)
        )
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Active => write!(f, "active"),
            MemberStatus::Removed => write!(f, "removed"),
            MemberStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MemberStatus::Active),
            "removed" => Ok(MemberStatus::Removed),
            "failed" => Ok(MemberStatus::Failed),
            other => Err(format!("unknown member status: {}", other)),
        }
    }
}

/// One member of a batch.
///
/// `data_json` is the point-in-time snapshot of source columns, frozen at
/// insert. `worker_data_json` accumulates step outputs and wins over
/// `data_json` on key collisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMember {
    pub id: MemberId,
    pub batch_id: BatchId,
    /// Primary-key column value from the data source.
    pub member_key: String,
    pub status: MemberStatus,
    pub data_json: Value,
    pub worker_data_json: Value,
    pub added_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
    pub add_dispatched_at: Option<DateTime<Utc>>,
    pub remove_dispatched_at: Option<DateTime<Utc>>,
}

impl BatchMember {
    /// Merge `data_json` and `worker_data_json` into a single object,
    /// worker values winning on collision.
    pub fn merged_data(&self) -> Map<String, Value> {
        let mut merged = match &self.data_json {
            Value::Object(m) => m.clone(),
            _ => Map::new(),
        };
        if let Value::Object(worker) = &self.worker_data_json {
            for (k, v) in worker {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
#[path = "member_tests.rs"]
mod tests;
