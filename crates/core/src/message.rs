// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message schemas for the orchestrator-events, worker-jobs, and
//! worker-results topics
//!
//! Bodies are JSON (`ContentType: application/json`); the variant is
//! carried in the `MessageType` application property, and worker jobs are
//! routed by the `WorkerId` property.

use crate::batch::BatchId;
use crate::execution::{InitExecutionId, PhaseExecutionId, StepExecutionId};
use crate::job::JobId;
use crate::member::MemberId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Application property holding the message variant name.
pub const MESSAGE_TYPE_PROP: &str = "MessageType";
/// Application property used for worker-jobs subscription filtering.
pub const WORKER_ID_PROP: &str = "WorkerId";
/// Content type for all engine messages.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Failure to decode an inbound message into a typed event.
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("undecodable {kind} body: {source}")]
    Body {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Published when a batch is detected (or a manual batch is advanced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInitMsg {
    pub runbook_name: String,
    pub runbook_version: i32,
    pub batch_id: BatchId,
    pub batch_start_time: Option<DateTime<Utc>>,
    pub member_count: u64,
}

/// Published when a phase execution becomes due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDueMsg {
    pub phase_execution_id: PhaseExecutionId,
    pub phase_name: String,
    pub batch_id: BatchId,
    pub runbook_name: String,
    /// Version of the phase row being dispatched — during a version
    /// transition this may differ from the currently active version.
    pub runbook_version: i32,
    pub offset_minutes: i64,
    pub due_at: Option<DateTime<Utc>>,
    pub member_ids: Vec<MemberId>,
}

/// Published when member sync adds or removes a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEventMsg {
    pub runbook_name: String,
    pub runbook_version: i32,
    pub batch_id: BatchId,
    pub batch_member_id: MemberId,
    pub member_key: String,
}

/// Scheduled self-message driving the poll loop of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollCheckMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_execution_id: Option<StepExecutionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_execution_id: Option<InitExecutionId>,
    pub poll_count: i32,
}

/// Scheduled self-message firing a delayed retry of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryCheckMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_execution_id: Option<StepExecutionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_execution_id: Option<InitExecutionId>,
    /// Expected retry count; a mismatch means the step was cancelled or
    /// superseded and the check is dropped.
    pub retry_count: i32,
}

/// Events consumed by the orchestrator off the orchestrator-events topic.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    BatchInit(BatchInitMsg),
    PhaseDue(PhaseDueMsg),
    MemberAdded(MemberEventMsg),
    MemberRemoved(MemberEventMsg),
    PollCheck(PollCheckMsg),
    RetryCheck(RetryCheckMsg),
}

impl OrchestratorEvent {
    /// The `MessageType` property value for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorEvent::BatchInit(_) => "batch-init",
            OrchestratorEvent::PhaseDue(_) => "phase-due",
            OrchestratorEvent::MemberAdded(_) => "member-added",
            OrchestratorEvent::MemberRemoved(_) => "member-removed",
            OrchestratorEvent::PollCheck(_) => "poll-check",
            OrchestratorEvent::RetryCheck(_) => "retry-check",
        }
    }

    /// Serialize the payload body.
    pub fn to_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            OrchestratorEvent::BatchInit(m) => serde_json::to_value(m),
            OrchestratorEvent::PhaseDue(m) => serde_json::to_value(m),
            OrchestratorEvent::MemberAdded(m) => serde_json::to_value(m),
            OrchestratorEvent::MemberRemoved(m) => serde_json::to_value(m),
            OrchestratorEvent::PollCheck(m) => serde_json::to_value(m),
            OrchestratorEvent::RetryCheck(m) => serde_json::to_value(m),
        }
    }

    /// Decode an event from its `MessageType` property and JSON body.
    pub fn from_parts(
        kind: &str,
        body: &serde_json::Value,
    ) -> Result<Self, MessageDecodeError> {
        let wrap = |source| MessageDecodeError::Body {
            kind: kind.to_string(),
            source,
        };
        match kind {
            "batch-init" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::BatchInit)
                .map_err(wrap),
            "phase-due" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::PhaseDue)
                .map_err(wrap),
            "member-added" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::MemberAdded)
                .map_err(wrap),
            "member-removed" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::MemberRemoved)
                .map_err(wrap),
            "poll-check" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::PollCheck)
                .map_err(wrap),
            "retry-check" => serde_json::from_value(body.clone())
                .map(OrchestratorEvent::RetryCheck)
                .map_err(wrap),
            other => Err(MessageDecodeError::UnknownKind(other.to_string())),
        }
    }

    /// One-line summary for structured logs.
    pub fn log_summary(&self) -> String {
        let t = self.kind();
        match self {
            OrchestratorEvent::BatchInit(m) => format!(
                "{t} runbook={} v={} batch={} members={}",
                m.runbook_name, m.runbook_version, m.batch_id, m.member_count
            ),
            OrchestratorEvent::PhaseDue(m) => format!(
                "{t} phase={} batch={} v={} members={}",
                m.phase_name,
                m.batch_id,
                m.runbook_version,
                m.member_ids.len()
            ),
            OrchestratorEvent::MemberAdded(m) | OrchestratorEvent::MemberRemoved(m) => {
                format!(
                    "{t} batch={} member={} key={}",
                    m.batch_id, m.batch_member_id, m.member_key
                )
            }
            OrchestratorEvent::PollCheck(m) => match (&m.step_execution_id, &m.init_execution_id) {
                (Some(id), _) => format!("{t} step={} poll={}", id, m.poll_count),
                (None, Some(id)) => format!("{t} init={} poll={}", id, m.poll_count),
                (None, None) => t.to_string(),
            },
            OrchestratorEvent::RetryCheck(m) => match (&m.step_execution_id, &m.init_execution_id)
            {
                (Some(id), _) => format!("{t} step={} retry={}", id, m.retry_count),
                (None, Some(id)) => format!("{t} init={} retry={}", id, m.retry_count),
                (None, None) => t.to_string(),
            },
        }
    }
}

/// Correlation record threaded through a job so the result can be routed
/// back to its execution row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCorrelationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_execution_id: Option<StepExecutionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_execution_id: Option<InitExecutionId>,
    #[serde(default)]
    pub is_init_step: bool,
    pub runbook_name: String,
    pub runbook_version: i32,
}

/// One job addressed to a worker, routed by the `WorkerId` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub job_id: JobId,
    pub batch_id: BatchId,
    pub worker_id: String,
    pub function_name: String,
    pub parameters: HashMap<String, String>,
    pub correlation_data: JobCorrelationData,
    /// Set on poll calls so workers distinguish "check progress" from
    /// "start work".
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_poll_call: bool,
}

/// Worker-reported outcome of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerResultStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Progress shape reported by polling functions:
/// `{complete: bool, data?: object}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One message off the worker-results topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub job_id: JobId,
    pub status: WorkerResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerError>,
    /// Absent or malformed correlation data dead-letters the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_data: Option<JobCorrelationData>,
}

impl WorkerResult {
    /// Interpret `result` as the polling shape, if it is one.
    ///
    /// Only an object with a boolean `complete` field qualifies; anything
    /// else on a poll-flagged step is treated as unrecognized.
    pub fn poll_result(&self) -> Option<PollResult> {
        let obj = self.result.as_ref()?.as_object()?;
        obj.get("complete")?.as_bool()?;
        serde_json::from_value(self.result.clone()?).ok()
    }

    pub fn error_message(&self) -> String {
        match &self.error {
            Some(e) => e.message.clone(),
            None => "worker reported failure".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
