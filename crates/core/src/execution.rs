// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase, step, and init execution rows with their status state machines
//!
//! Every concurrency-sensitive transition between these statuses goes
//! through a compare-and-swap in the store; the `can_transition` tables
//! here are the single source of truth for what the CAS calls may attempt.

use crate::batch::BatchId;
use crate::member::MemberId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

crate::define_int_id! {
    /// Identifier of a phase execution row.
    pub struct PhaseExecutionId;
}

crate::define_int_id! {
    /// Identifier of a step execution row.
    pub struct StepExecutionId;
}

crate::define_int_id! {
    /// Identifier of an init execution row.
    pub struct InitExecutionId;
}

/// Lifecycle status of a phase execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Dispatched,
    Completed,
    Skipped,
    Failed,
    Superseded,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed
                | PhaseStatus::Skipped
                | PhaseStatus::Failed
                | PhaseStatus::Superseded
        )
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition(&self, to: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, to),
            (Pending, Dispatched)
                | (Pending, Skipped)
                | (Pending, Superseded)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
        )
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Dispatched => write!(f, "dispatched"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Superseded => write!(f, "superseded"),
        }
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PhaseStatus::Pending),
            "dispatched" => Ok(PhaseStatus::Dispatched),
            "completed" => Ok(PhaseStatus::Completed),
            "skipped" => Ok(PhaseStatus::Skipped),
            "failed" => Ok(PhaseStatus::Failed),
            "superseded" => Ok(PhaseStatus::Superseded),
            other => Err(format!("unknown phase status: {}", other)),
        }
    }
}

/// Lifecycle status of a step or init execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Dispatched,
    Polling,
    Succeeded,
    Failed,
    PollTimeout,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded
                | StepStatus::Failed
                | StepStatus::PollTimeout
                | StepStatus::Cancelled
        )
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// `dispatched → pending` and `polling → pending` are the retry paths;
    /// the caller must bump `retry_count` in the same statement.
    pub fn can_transition(&self, to: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, to),
            (Pending, Dispatched)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Dispatched, Succeeded)
                | (Dispatched, Failed)
                | (Dispatched, Polling)
                | (Dispatched, Pending)
                | (Dispatched, Cancelled)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Polling, Pending)
                | (Polling, PollTimeout)
                | (Polling, Cancelled)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Dispatched => write!(f, "dispatched"),
            StepStatus::Polling => write!(f, "polling"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::PollTimeout => write!(f, "poll_timeout"),
            StepStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "dispatched" => Ok(StepStatus::Dispatched),
            "polling" => Ok(StepStatus::Polling),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed" => Ok(StepStatus::Failed),
            "poll_timeout" => Ok(StepStatus::PollTimeout),
            "cancelled" => Ok(StepStatus::Cancelled),
            other => Err(format!("unknown step status: {}", other)),
        }
    }
}

/// One phase of a batch, per runbook version the batch has been exposed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub id: PhaseExecutionId,
    pub batch_id: BatchId,
    pub phase_name: String,
    pub offset_minutes: i64,
    /// `batch_start_time − offset_minutes`; null for manual batches until
    /// they are advanced.
    pub due_at: Option<DateTime<Utc>>,
    pub runbook_version: i32,
    pub status: PhaseStatus,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One function call for one member within one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub phase_execution_id: PhaseExecutionId,
    pub batch_member_id: MemberId,
    pub step_name: String,
    pub step_index: i32,
    pub worker_id: String,
    pub function_name: String,
    /// Parameter map as stored at creation: resolved values where the
    /// context sufficed, raw `{{…}}` templates where it did not.
    pub params_json: HashMap<String, String>,
    pub result_json: Option<serde_json::Value>,
    pub status: StepStatus,
    pub is_poll_step: bool,
    pub poll_interval_secs: Option<i64>,
    pub poll_timeout_secs: Option<i64>,
    pub poll_started_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub poll_count: i32,
    /// Name of the rollback sequence fired on terminal failure.
    pub on_failure: Option<String>,
    pub max_retries: i32,
    pub retry_count: i32,
    pub retry_interval_secs: i64,
    pub retry_after: Option<DateTime<Utc>>,
    pub job_id: Option<crate::job::JobId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One batch-level init step; same shape as a step execution but attached
/// to the batch and executed strictly sequentially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitExecution {
    pub id: InitExecutionId,
    pub batch_id: BatchId,
    pub runbook_version: i32,
    pub step_name: String,
    pub step_index: i32,
    pub worker_id: String,
    pub function_name: String,
    pub params_json: HashMap<String, String>,
    pub result_json: Option<serde_json::Value>,
    pub status: StepStatus,
    pub is_poll_step: bool,
    pub poll_interval_secs: Option<i64>,
    pub poll_timeout_secs: Option<i64>,
    pub poll_started_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub poll_count: i32,
    pub on_failure: Option<String>,
    pub max_retries: i32,
    pub retry_count: i32,
    pub retry_interval_secs: i64,
    pub retry_after: Option<DateTime<Utc>>,
    pub job_id: Option<crate::job::JobId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
