// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repository trait and its input/filter types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{
    AutomationSetting, Batch, BatchId, BatchMember, BatchStatus, InitExecution, InitExecutionId,
    JobId, MemberId, MemberStatus, OverdueBehavior, PhaseExecution, PhaseExecutionId, PhaseStatus,
    Runbook, RunbookId, StepExecution, StepExecutionId, StepStatus,
};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from the store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Input for publishing a new runbook version.
#[derive(Debug, Clone)]
pub struct NewRunbook {
    pub name: String,
    pub document: String,
    pub data_table_name: String,
    pub overdue_behavior: OverdueBehavior,
    pub rerun_init: bool,
}

/// Input for creating a batch.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub runbook_id: RunbookId,
    pub batch_start_time: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub is_manual: bool,
    pub created_by: Option<String>,
}

/// Input for inserting a member with its frozen source snapshot.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub batch_id: BatchId,
    pub member_key: String,
    pub data_json: Value,
}

/// Input for creating a phase execution row.
#[derive(Debug, Clone)]
pub struct NewPhaseExecution {
    pub batch_id: BatchId,
    pub phase_name: String,
    pub offset_minutes: i64,
    pub due_at: Option<DateTime<Utc>>,
    pub runbook_version: i32,
    pub status: PhaseStatus,
}

/// Input for creating a step execution row.
#[derive(Debug, Clone)]
pub struct NewStepExecution {
    pub phase_execution_id: PhaseExecutionId,
    pub batch_member_id: MemberId,
    pub step_name: String,
    pub step_index: i32,
    pub worker_id: String,
    pub function_name: String,
    pub params_json: HashMap<String, String>,
    pub is_poll_step: bool,
    pub poll_interval_secs: Option<i64>,
    pub poll_timeout_secs: Option<i64>,
    pub on_failure: Option<String>,
    pub max_retries: i32,
    pub retry_interval_secs: i64,
}

/// Input for creating an init execution row.
#[derive(Debug, Clone)]
pub struct NewInitExecution {
    pub batch_id: BatchId,
    pub runbook_version: i32,
    pub step_name: String,
    pub step_index: i32,
    pub worker_id: String,
    pub function_name: String,
    pub params_json: HashMap<String, String>,
    pub is_poll_step: bool,
    pub poll_interval_secs: Option<i64>,
    pub poll_timeout_secs: Option<i64>,
    pub on_failure: Option<String>,
    pub max_retries: i32,
    pub retry_interval_secs: i64,
}

/// Admin list filter for batches.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub runbook_name: Option<String>,
    pub status: Option<BatchStatus>,
    pub is_manual: Option<bool>,
}

/// Pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// The repository surface over the relational schema.
///
/// Mutating methods take `now` explicitly so stores stay clock-free and
/// tests stay deterministic. CAS methods return whether the caller made
/// the transition.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- runbooks --

    /// Publish a new version: assigns `max(version) + 1` for the name,
    /// deactivates all prior versions, and inserts the new row active, in
    /// one transaction.
    async fn publish_runbook(
        &self,
        new: NewRunbook,
        now: DateTime<Utc>,
    ) -> Result<Runbook, StoreError>;

    async fn get_runbook(&self, id: RunbookId) -> Result<Option<Runbook>, StoreError>;

    /// Fetch by name: a specific version, or the active one when `version`
    /// is `None`.
    async fn get_runbook_by_name(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<Runbook>, StoreError>;

    async fn list_active_runbooks(&self) -> Result<Vec<Runbook>, StoreError>;

    async fn list_runbook_versions(&self, name: &str) -> Result<Vec<Runbook>, StoreError>;

    /// Deactivate one version; returns whether a row changed.
    async fn deactivate_runbook(&self, name: &str, version: i32) -> Result<bool, StoreError>;

    // -- automation --

    async fn automation(&self, name: &str) -> Result<Option<AutomationSetting>, StoreError>;

    async fn set_automation(
        &self,
        name: &str,
        enabled: bool,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<AutomationSetting, StoreError>;

    // -- batches --

    async fn insert_batch(&self, new: NewBatch, now: DateTime<Utc>)
        -> Result<Batch, StoreError>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Scheduled-batch lookup by `(runbook_name, batch_start_time)`, across
    /// all versions of the name.
    async fn find_batch_by_start_time(
        &self,
        runbook_name: &str,
        start: DateTime<Utc>,
    ) -> Result<Option<Batch>, StoreError>;

    async fn list_batches(
        &self,
        filter: BatchFilter,
        page: Page,
    ) -> Result<Vec<Batch>, StoreError>;

    /// Non-terminal batches of any version of the named runbook.
    async fn active_batches_for_runbook(
        &self,
        runbook_name: &str,
    ) -> Result<Vec<Batch>, StoreError>;

    async fn cas_batch_status(
        &self,
        id: BatchId,
        from: BatchStatus,
        to: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_batch_current_phase(
        &self,
        id: BatchId,
        phase: Option<String>,
    ) -> Result<(), StoreError>;

    /// Stamp the start time of a manual batch when it is advanced.
    async fn set_batch_start_time(
        &self,
        id: BatchId,
        start: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // -- members --

    /// Insert a member; returns `None` when `(batch_id, member_key)`
    /// already exists.
    async fn insert_member(
        &self,
        new: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Option<BatchMember>, StoreError>;

    async fn get_member(&self, id: MemberId) -> Result<Option<BatchMember>, StoreError>;

    async fn members_of_batch(&self, batch_id: BatchId)
        -> Result<Vec<BatchMember>, StoreError>;

    /// CAS the member status; `removed` stamps `removed_at` and clears
    /// `remove_dispatched_at`, `active` (re-add) clears `removed_at`.
    async fn cas_member_status(
        &self,
        id: MemberId,
        from: MemberStatus,
        to: MemberStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Merge step outputs into `worker_data_json`, new keys winning.
    async fn merge_worker_data(
        &self,
        id: MemberId,
        updates: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn mark_member_add_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_member_remove_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // -- phase executions --

    async fn insert_phase_execution(
        &self,
        new: NewPhaseExecution,
        now: DateTime<Utc>,
    ) -> Result<PhaseExecution, StoreError>;

    async fn get_phase_execution(
        &self,
        id: PhaseExecutionId,
    ) -> Result<Option<PhaseExecution>, StoreError>;

    async fn phases_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<PhaseExecution>, StoreError>;

    /// CAS the phase status; `dispatched` stamps `dispatched_at`, terminal
    /// statuses stamp `completed_at`.
    async fn cas_phase_status(
        &self,
        id: PhaseExecutionId,
        from: PhaseStatus,
        to: PhaseStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // -- step executions --

    /// Bulk insert, skipping rows whose
    /// `(phase_execution_id, batch_member_id, step_index)` already exists.
    /// Returns how many rows were actually inserted.
    async fn insert_step_executions(
        &self,
        rows: Vec<NewStepExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn get_step_execution(
        &self,
        id: StepExecutionId,
    ) -> Result<Option<StepExecution>, StoreError>;

    async fn steps_of_phase(
        &self,
        phase_execution_id: PhaseExecutionId,
    ) -> Result<Vec<StepExecution>, StoreError>;

    /// Non-terminal steps of a member across every phase of its batch.
    async fn non_terminal_steps_of_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<StepExecution>, StoreError>;

    async fn cas_step_status(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS `from → dispatched`, recording the job id and the re-resolved
    /// parameters sent to the worker.
    async fn mark_step_dispatched(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS `from → succeeded`, storing the result body.
    async fn succeed_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS `from → failed` (or `poll_timeout`), storing the error message.
    async fn fail_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Retry bookkeeping: CAS `from → pending`, bump `retry_count`, set
    /// `retry_after`.
    async fn step_retry_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Poll bookkeeping: CAS `from → polling`, set `poll_started_at` if
    /// unset, update `last_polled_at`, bump `poll_count`.
    async fn step_poll_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // -- init executions --

    /// Idempotent bulk insert: skipped entirely when any row already
    /// exists for `(batch_id, runbook_version)`. Returns inserted count.
    async fn insert_init_executions(
        &self,
        rows: Vec<NewInitExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn get_init_execution(
        &self,
        id: InitExecutionId,
    ) -> Result<Option<InitExecution>, StoreError>;

    /// Init rows of a batch for one runbook version, ordered by index.
    async fn inits_of_batch(
        &self,
        batch_id: BatchId,
        runbook_version: i32,
    ) -> Result<Vec<InitExecution>, StoreError>;

    async fn cas_init_status(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_init_dispatched(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn succeed_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn fail_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn init_retry_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn init_poll_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
