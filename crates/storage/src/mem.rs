// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store with the same constraint and CAS semantics as Postgres
//!
//! Backs the engine's test suites. Unique constraints, status CAS, and
//! worker-data merge precedence all behave exactly like the SQL schema, so
//! engine logic exercised here transfers to the real store.

use crate::store::{
    BatchFilter, NewBatch, NewInitExecution, NewMember, NewPhaseExecution, NewRunbook,
    NewStepExecution, Page, Store, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{
    AutomationSetting, Batch, BatchId, BatchMember, BatchStatus, InitExecution, InitExecutionId,
    JobId, MemberId, MemberStatus, PhaseExecution, PhaseExecutionId, PhaseStatus, Runbook,
    RunbookId, StepExecution, StepExecutionId, StepStatus,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    runbooks: Vec<Runbook>,
    automation: HashMap<String, AutomationSetting>,
    batches: Vec<Batch>,
    members: Vec<BatchMember>,
    phases: Vec<PhaseExecution>,
    steps: Vec<StepExecution>,
    inits: Vec<InitExecution>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn runbook_ids_for_name(&self, name: &str) -> Vec<RunbookId> {
        self.runbooks
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.id)
            .collect()
    }
}

/// In-memory [`Store`] implementation for tests and development.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    // -- runbooks --

    async fn publish_runbook(
        &self,
        new: NewRunbook,
        now: DateTime<Utc>,
    ) -> Result<Runbook, StoreError> {
        let mut inner = self.inner.lock();
        let version = inner
            .runbooks
            .iter()
            .filter(|r| r.name == new.name)
            .map(|r| r.version)
            .max()
            .unwrap_or(0)
            + 1;
        for runbook in inner.runbooks.iter_mut().filter(|r| r.name == new.name) {
            runbook.is_active = false;
        }
        let id = RunbookId::new(inner.next_id());
        let runbook = Runbook {
            id,
            name: new.name,
            version,
            document: new.document,
            data_table_name: new.data_table_name,
            is_active: true,
            overdue_behavior: new.overdue_behavior,
            rerun_init: new.rerun_init,
            created_at: now,
        };
        inner.runbooks.push(runbook.clone());
        Ok(runbook)
    }

    async fn get_runbook(&self, id: RunbookId) -> Result<Option<Runbook>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.runbooks.iter().find(|r| r.id == id).cloned())
    }

    async fn get_runbook_by_name(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<Runbook>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .runbooks
            .iter()
            .find(|r| {
                r.name == name
                    && match version {
                        Some(v) => r.version == v,
                        None => r.is_active,
                    }
            })
            .cloned())
    }

    async fn list_active_runbooks(&self) -> Result<Vec<Runbook>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .runbooks
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }

    async fn list_runbook_versions(&self, name: &str) -> Result<Vec<Runbook>, StoreError> {
        let inner = self.inner.lock();
        let mut versions: Vec<Runbook> = inner
            .runbooks
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect();
        versions.sort_by_key(|r| r.version);
        Ok(versions)
    }

    async fn deactivate_runbook(&self, name: &str, version: i32) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        for runbook in inner
            .runbooks
            .iter_mut()
            .filter(|r| r.name == name && r.version == version && r.is_active)
        {
            runbook.is_active = false;
            return Ok(true);
        }
        Ok(false)
    }

    // -- automation --

    async fn automation(&self, name: &str) -> Result<Option<AutomationSetting>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.automation.get(name).cloned())
    }

    async fn set_automation(
        &self,
        name: &str,
        enabled: bool,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<AutomationSetting, StoreError> {
        let mut inner = self.inner.lock();
        let setting = AutomationSetting {
            runbook_name: name.to_string(),
            enabled,
            updated_at: now,
            updated_by: actor.to_string(),
        };
        inner.automation.insert(name.to_string(), setting.clone());
        Ok(setting)
    }

    // -- batches --

    async fn insert_batch(
        &self,
        new: NewBatch,
        now: DateTime<Utc>,
    ) -> Result<Batch, StoreError> {
        let mut inner = self.inner.lock();
        let id = BatchId::new(inner.next_id());
        let batch = Batch {
            id,
            runbook_id: new.runbook_id,
            batch_start_time: new.batch_start_time,
            status: new.status,
            is_manual: new.is_manual,
            created_by: new.created_by,
            current_phase: None,
            detected_at: now,
            init_dispatched_at: None,
        };
        inner.batches.push(batch.clone());
        Ok(batch)
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn find_batch_by_start_time(
        &self,
        runbook_name: &str,
        start: DateTime<Utc>,
    ) -> Result<Option<Batch>, StoreError> {
        let inner = self.inner.lock();
        let ids = inner.runbook_ids_for_name(runbook_name);
        Ok(inner
            .batches
            .iter()
            .find(|b| {
                !b.is_manual
                    && ids.contains(&b.runbook_id)
                    && b.batch_start_time == Some(start)
            })
            .cloned())
    }

    async fn list_batches(
        &self,
        filter: BatchFilter,
        page: Page,
    ) -> Result<Vec<Batch>, StoreError> {
        let inner = self.inner.lock();
        let name_ids = filter
            .runbook_name
            .as_deref()
            .map(|name| inner.runbook_ids_for_name(name));
        let mut rows: Vec<Batch> = inner
            .batches
            .iter()
            .filter(|b| {
                name_ids
                    .as_ref()
                    .map(|ids| ids.contains(&b.runbook_id))
                    .unwrap_or(true)
                    && filter.status.map(|s| b.status == s).unwrap_or(true)
                    && filter.is_manual.map(|m| b.is_manual == m).unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|b| std::cmp::Reverse(b.id));
        Ok(rows
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect())
    }

    async fn active_batches_for_runbook(
        &self,
        runbook_name: &str,
    ) -> Result<Vec<Batch>, StoreError> {
        let inner = self.inner.lock();
        let ids = inner.runbook_ids_for_name(runbook_name);
        Ok(inner
            .batches
            .iter()
            .filter(|b| ids.contains(&b.runbook_id) && !b.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn cas_batch_status(
        &self,
        id: BatchId,
        from: BatchStatus,
        to: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug_assert!(from.can_transition(to), "illegal batch CAS {from} -> {to}");
        let mut inner = self.inner.lock();
        let Some(batch) = inner.batches.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if batch.status != from {
            return Ok(false);
        }
        batch.status = to;
        if to == BatchStatus::InitDispatched {
            batch.init_dispatched_at = Some(now);
        }
        Ok(true)
    }

    async fn set_batch_current_phase(
        &self,
        id: BatchId,
        phase: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(batch) = inner.batches.iter_mut().find(|b| b.id == id) {
            batch.current_phase = phase;
        }
        Ok(())
    }

    async fn set_batch_start_time(
        &self,
        id: BatchId,
        start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(batch) = inner.batches.iter_mut().find(|b| b.id == id) {
            batch.batch_start_time = Some(start);
        }
        Ok(())
    }

    // -- members --

    async fn insert_member(
        &self,
        new: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Option<BatchMember>, StoreError> {
        let mut inner = self.inner.lock();
        let exists = inner
            .members
            .iter()
            .any(|m| m.batch_id == new.batch_id && m.member_key == new.member_key);
        if exists {
            return Ok(None);
        }
        let id = MemberId::new(inner.next_id());
        let member = BatchMember {
            id,
            batch_id: new.batch_id,
            member_key: new.member_key,
            status: MemberStatus::Active,
            data_json: new.data_json,
            worker_data_json: Value::Object(serde_json::Map::new()),
            added_at: now,
            removed_at: None,
            add_dispatched_at: None,
            remove_dispatched_at: None,
        };
        inner.members.push(member.clone());
        Ok(Some(member))
    }

    async fn get_member(&self, id: MemberId) -> Result<Option<BatchMember>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.members.iter().find(|m| m.id == id).cloned())
    }

    async fn members_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchMember>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .members
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn cas_member_status(
        &self,
        id: MemberId,
        from: MemberStatus,
        to: MemberStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug_assert!(from.can_transition(to), "illegal member CAS {from} -> {to}");
        let mut inner = self.inner.lock();
        let Some(member) = inner.members.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        if member.status != from {
            return Ok(false);
        }
        member.status = to;
        match to {
            MemberStatus::Removed => {
                member.removed_at = Some(now);
                member.remove_dispatched_at = None;
            }
            MemberStatus::Active => {
                member.removed_at = None;
                member.add_dispatched_at = None;
            }
            MemberStatus::Failed => {}
        }
        Ok(true)
    }

    async fn merge_worker_data(
        &self,
        id: MemberId,
        updates: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let Some(member) = inner.members.iter_mut().find(|m| m.id == id) else {
            return Err(StoreError::NotFound(format!("member {id}")));
        };
        let mut merged = match &member.worker_data_json {
            Value::Object(m) => m.clone(),
            _ => serde_json::Map::new(),
        };
        for (k, v) in updates {
            merged.insert(k, v);
        }
        member.worker_data_json = Value::Object(merged);
        Ok(())
    }

    async fn mark_member_add_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(member) = inner.members.iter_mut().find(|m| m.id == id) {
            member.add_dispatched_at = Some(now);
        }
        Ok(())
    }

    async fn mark_member_remove_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(member) = inner.members.iter_mut().find(|m| m.id == id) {
            member.remove_dispatched_at = Some(now);
        }
        Ok(())
    }

    // -- phase executions --

    async fn insert_phase_execution(
        &self,
        new: NewPhaseExecution,
        now: DateTime<Utc>,
    ) -> Result<PhaseExecution, StoreError> {
        let mut inner = self.inner.lock();
        let duplicate = inner.phases.iter().any(|p| {
            p.batch_id == new.batch_id
                && p.phase_name == new.phase_name
                && p.runbook_version == new.runbook_version
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "phase execution exists: batch {} phase {} v{}",
                new.batch_id, new.phase_name, new.runbook_version
            )));
        }
        let id = PhaseExecutionId::new(inner.next_id());
        let phase = PhaseExecution {
            id,
            batch_id: new.batch_id,
            phase_name: new.phase_name,
            offset_minutes: new.offset_minutes,
            due_at: new.due_at,
            runbook_version: new.runbook_version,
            status: new.status,
            created_at: now,
            dispatched_at: None,
            completed_at: None,
        };
        inner.phases.push(phase.clone());
        Ok(phase)
    }

    async fn get_phase_execution(
        &self,
        id: PhaseExecutionId,
    ) -> Result<Option<PhaseExecution>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.phases.iter().find(|p| p.id == id).cloned())
    }

    async fn phases_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<PhaseExecution>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .phases
            .iter()
            .filter(|p| p.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn cas_phase_status(
        &self,
        id: PhaseExecutionId,
        from: PhaseStatus,
        to: PhaseStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug_assert!(from.can_transition(to), "illegal phase CAS {from} -> {to}");
        let mut inner = self.inner.lock();
        let Some(phase) = inner.phases.iter_mut().find(|p| p.id == id) else {
            return Ok(false);
        };
        if phase.status != from {
            return Ok(false);
        }
        phase.status = to;
        if to == PhaseStatus::Dispatched {
            phase.dispatched_at = Some(now);
        }
        if to.is_terminal() {
            phase.completed_at = Some(now);
        }
        Ok(true)
    }

    // -- step executions --

    async fn insert_step_executions(
        &self,
        rows: Vec<NewStepExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for new in rows {
            let exists = inner.steps.iter().any(|s| {
                s.phase_execution_id == new.phase_execution_id
                    && s.batch_member_id == new.batch_member_id
                    && s.step_index == new.step_index
            });
            if exists {
                continue;
            }
            let id = StepExecutionId::new(inner.next_id());
            inner.steps.push(StepExecution {
                id,
                phase_execution_id: new.phase_execution_id,
                batch_member_id: new.batch_member_id,
                step_name: new.step_name,
                step_index: new.step_index,
                worker_id: new.worker_id,
                function_name: new.function_name,
                params_json: new.params_json,
                result_json: None,
                status: StepStatus::Pending,
                is_poll_step: new.is_poll_step,
                poll_interval_secs: new.poll_interval_secs,
                poll_timeout_secs: new.poll_timeout_secs,
                poll_started_at: None,
                last_polled_at: None,
                poll_count: 0,
                on_failure: new.on_failure,
                max_retries: new.max_retries,
                retry_count: 0,
                retry_interval_secs: new.retry_interval_secs,
                retry_after: None,
                job_id: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_step_execution(
        &self,
        id: StepExecutionId,
    ) -> Result<Option<StepExecution>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.steps.iter().find(|s| s.id == id).cloned())
    }

    async fn steps_of_phase(
        &self,
        phase_execution_id: PhaseExecutionId,
    ) -> Result<Vec<StepExecution>, StoreError> {
        let inner = self.inner.lock();
        let mut steps: Vec<StepExecution> = inner
            .steps
            .iter()
            .filter(|s| s.phase_execution_id == phase_execution_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.batch_member_id, s.step_index));
        Ok(steps)
    }

    async fn non_terminal_steps_of_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<StepExecution>, StoreError> {
        let inner = self.inner.lock();
        let mut steps: Vec<StepExecution> = inner
            .steps
            .iter()
            .filter(|s| s.batch_member_id == member_id && !s.status.is_terminal())
            .cloned()
            .collect();
        steps.sort_by_key(|s| (s.phase_execution_id, s.step_index));
        Ok(steps)
    }

    async fn cas_step_status(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug_assert!(from.can_transition(to), "illegal step CAS {from} -> {to}");
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = to;
        step.updated_at = now;
        Ok(true)
    }

    async fn mark_step_dispatched(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = StepStatus::Dispatched;
        step.job_id = Some(job_id.clone());
        step.params_json = params_json;
        step.updated_at = now;
        Ok(true)
    }

    async fn succeed_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = StepStatus::Succeeded;
        step.result_json = result_json;
        step.updated_at = now;
        Ok(true)
    }

    async fn fail_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = to;
        step.error_message = Some(error_message.to_string());
        step.updated_at = now;
        Ok(true)
    }

    async fn step_retry_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = StepStatus::Pending;
        step.retry_count += 1;
        step.retry_after = Some(retry_after);
        step.updated_at = now;
        Ok(true)
    }

    async fn step_poll_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(step) = inner.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if step.status != from {
            return Ok(false);
        }
        step.status = StepStatus::Polling;
        if step.poll_started_at.is_none() {
            step.poll_started_at = Some(now);
        }
        step.last_polled_at = Some(now);
        step.poll_count += 1;
        step.updated_at = now;
        Ok(true)
    }

    // -- init executions --

    async fn insert_init_executions(
        &self,
        rows: Vec<NewInitExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let exists = inner.inits.iter().any(|i| {
            i.batch_id == first.batch_id && i.runbook_version == first.runbook_version
        });
        if exists {
            return Ok(0);
        }
        let mut inserted = 0;
        for new in rows {
            let id = InitExecutionId::new(inner.next_id());
            inner.inits.push(InitExecution {
                id,
                batch_id: new.batch_id,
                runbook_version: new.runbook_version,
                step_name: new.step_name,
                step_index: new.step_index,
                worker_id: new.worker_id,
                function_name: new.function_name,
                params_json: new.params_json,
                result_json: None,
                status: StepStatus::Pending,
                is_poll_step: new.is_poll_step,
                poll_interval_secs: new.poll_interval_secs,
                poll_timeout_secs: new.poll_timeout_secs,
                poll_started_at: None,
                last_polled_at: None,
                poll_count: 0,
                on_failure: new.on_failure,
                max_retries: new.max_retries,
                retry_count: 0,
                retry_interval_secs: new.retry_interval_secs,
                retry_after: None,
                job_id: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn get_init_execution(
        &self,
        id: InitExecutionId,
    ) -> Result<Option<InitExecution>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.inits.iter().find(|i| i.id == id).cloned())
    }

    async fn inits_of_batch(
        &self,
        batch_id: BatchId,
        runbook_version: i32,
    ) -> Result<Vec<InitExecution>, StoreError> {
        let inner = self.inner.lock();
        let mut inits: Vec<InitExecution> = inner
            .inits
            .iter()
            .filter(|i| i.batch_id == batch_id && i.runbook_version == runbook_version)
            .cloned()
            .collect();
        inits.sort_by_key(|i| i.step_index);
        Ok(inits)
    }

    async fn cas_init_status(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug_assert!(from.can_transition(to), "illegal init CAS {from} -> {to}");
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = to;
        init.updated_at = now;
        Ok(true)
    }

    async fn mark_init_dispatched(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = StepStatus::Dispatched;
        init.job_id = Some(job_id.clone());
        init.params_json = params_json;
        init.updated_at = now;
        Ok(true)
    }

    async fn succeed_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = StepStatus::Succeeded;
        init.result_json = result_json;
        init.updated_at = now;
        Ok(true)
    }

    async fn fail_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = to;
        init.error_message = Some(error_message.to_string());
        init.updated_at = now;
        Ok(true)
    }

    async fn init_retry_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = StepStatus::Pending;
        init.retry_count += 1;
        init.retry_after = Some(retry_after);
        init.updated_at = now;
        Ok(true)
    }

    async fn init_poll_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(init) = inner.inits.iter_mut().find(|i| i.id == id) else {
            return Ok(false);
        };
        if init.status != from {
            return Ok(false);
        }
        init.status = StepStatus::Polling;
        if init.poll_started_at.is_none() {
            init.poll_started_at = Some(now);
        }
        init.last_polled_at = Some(now);
        init.poll_count += 1;
        init.updated_at = now;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
