// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin operations
//!
//! The Admin API itself is an external collaborator; these are the engine
//! operations it calls into: validated runbook publishing, automation
//! toggles, and manual batch lifecycle (create / advance / cancel) plus
//! member management.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::phases::phase_rows_for_batch;
use crate::runtime::publish_event;
use convoy_adapters::SourceRow;
use convoy_bus::Bus;
use convoy_core::{
    AutomationSetting, Batch, BatchId, BatchInitMsg, BatchStatus, Clock, MemberEventMsg,
    MemberId, MemberStatus, OrchestratorEvent, OverdueBehavior, PhaseDueMsg, PhaseStatus, Runbook,
    StepStatus,
};
use convoy_runbook::{parse_runbook, parse_runbook_with_format, Format, RunbookDef};
use convoy_storage::{
    BatchFilter, NewBatch, NewMember, NewRunbook, Page, Store, StoreError,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Engine-side admin surface.
pub struct Admin<S, B, C> {
    store: Arc<S>,
    bus: Arc<B>,
    clock: C,
    config: Arc<EngineConfig>,
}

impl<S, B, C> Admin<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub fn new(store: Arc<S>, bus: Arc<B>, clock: C, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
        }
    }

    // -- runbooks --

    /// Validate and publish a runbook document as a new version of its
    /// name, deactivating all predecessors. Nothing is written when
    /// validation fails.
    pub async fn publish_runbook(
        &self,
        document: &str,
        format: Format,
        overdue_behavior: OverdueBehavior,
        rerun_init: bool,
    ) -> Result<Runbook, EngineError> {
        let def = parse_runbook_with_format(document, format)?;

        // data_table_name is stable across versions of a name.
        let data_table_name = match self
            .store
            .list_runbook_versions(&def.name)
            .await?
            .first()
        {
            Some(prior) => prior.data_table_name.clone(),
            None => format!("{}_members", def.name),
        };

        let runbook = self
            .store
            .publish_runbook(
                NewRunbook {
                    name: def.name.clone(),
                    document: document.to_string(),
                    data_table_name,
                    overdue_behavior,
                    rerun_init,
                },
                self.clock.now(),
            )
            .await?;
        tracing::info!(runbook = %runbook.name, version = runbook.version, "runbook published");
        Ok(runbook)
    }

    pub async fn list_active_runbooks(&self) -> Result<Vec<Runbook>, EngineError> {
        Ok(self.store.list_active_runbooks().await?)
    }

    pub async fn get_runbook(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<Runbook>, EngineError> {
        Ok(self.store.get_runbook_by_name(name, version).await?)
    }

    pub async fn list_runbook_versions(&self, name: &str) -> Result<Vec<Runbook>, EngineError> {
        Ok(self.store.list_runbook_versions(name).await?)
    }

    pub async fn deactivate_runbook(&self, name: &str, version: i32) -> Result<bool, EngineError> {
        Ok(self.store.deactivate_runbook(name, version).await?)
    }

    // -- automation --

    pub async fn automation(&self, name: &str) -> Result<Option<AutomationSetting>, EngineError> {
        Ok(self.store.automation(name).await?)
    }

    pub async fn set_automation(
        &self,
        name: &str,
        enabled: bool,
        actor: &str,
    ) -> Result<AutomationSetting, EngineError> {
        let setting = self
            .store
            .set_automation(name, enabled, actor, self.clock.now())
            .await?;
        tracing::info!(runbook = %name, enabled, actor, "automation toggled");
        Ok(setting)
    }

    // -- batches --

    /// Create a manual batch from a tabular payload. The start time stays
    /// null (and phases undated) until the batch is advanced.
    pub async fn create_manual_batch(
        &self,
        runbook_name: &str,
        rows: Vec<HashMap<String, String>>,
        created_by: &str,
    ) -> Result<Batch, EngineError> {
        let (runbook, def) = self.load_active_runbook(runbook_name).await?;
        let now = self.clock.now();

        let status = if def.init.is_empty() {
            BatchStatus::Active
        } else {
            BatchStatus::Detected
        };
        let batch = self
            .store
            .insert_batch(
                NewBatch {
                    runbook_id: runbook.id,
                    batch_start_time: None,
                    status,
                    is_manual: true,
                    created_by: Some(created_by.to_string()),
                },
                now,
            )
            .await?;

        for columns in rows {
            let row = SourceRow::new(columns);
            let Some(key) = row.member_key(&def.data_source) else {
                return Err(EngineError::InvalidRequest(format!(
                    "payload row missing primary key column '{}'",
                    def.data_source.primary_key
                )));
            };
            let inserted = self
                .store
                .insert_member(
                    NewMember {
                        batch_id: batch.id,
                        member_key: key.to_string(),
                        data_json: row.freeze(&def.data_source),
                    },
                    now,
                )
                .await?;
            if let Some(member) = inserted {
                self.store.mark_member_add_dispatched(member.id, now).await?;
            }
        }

        for row in phase_rows_for_batch(&def, runbook.version, &batch) {
            match self.store.insert_phase_execution(row, now).await {
                Ok(_) => {}
                Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(batch = %batch.id, runbook = %runbook.name, by = created_by, "manual batch created");
        Ok(batch)
    }

    pub async fn list_batches(
        &self,
        filter: BatchFilter,
        page: Page,
    ) -> Result<Vec<Batch>, EngineError> {
        Ok(self.store.list_batches(filter, page).await?)
    }

    pub async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, EngineError> {
        Ok(self.store.get_batch(id).await?)
    }

    /// Advance a manual batch one stage: dispatch init from `detected`,
    /// or fire the next pending phase when `active`.
    pub async fn advance_batch(&self, id: BatchId) -> Result<(), EngineError> {
        let Some(batch) = self.store.get_batch(id).await? else {
            return Err(EngineError::InvalidRequest(format!("unknown batch {id}")));
        };
        if !batch.is_manual {
            return Err(EngineError::InvalidRequest(
                "only manual batches can be advanced".to_string(),
            ));
        }
        let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "batch {id} has no runbook"
            )));
        };
        let now = self.clock.now();

        if batch.batch_start_time.is_none() {
            self.store.set_batch_start_time(batch.id, now).await?;
        }

        match batch.status {
            BatchStatus::Detected => {
                let member_count = self
                    .store
                    .members_of_batch(batch.id)
                    .await?
                    .iter()
                    .filter(|m| m.status == MemberStatus::Active)
                    .count() as u64;
                self.publish(&OrchestratorEvent::BatchInit(BatchInitMsg {
                    runbook_name: runbook.name.clone(),
                    runbook_version: runbook.version,
                    batch_id: batch.id,
                    batch_start_time: batch.batch_start_time.or(Some(now)),
                    member_count,
                }))
                .await
            }
            BatchStatus::InitDispatched => Err(EngineError::InvalidRequest(
                "batch init is still in progress".to_string(),
            )),
            BatchStatus::Active => {
                let phases = self.store.phases_of_batch(batch.id).await?;
                let Some(next) = phases
                    .iter()
                    .filter(|p| p.status == PhaseStatus::Pending)
                    .min_by_key(|p| p.id)
                else {
                    return Err(EngineError::InvalidRequest(
                        "no pending phases to advance".to_string(),
                    ));
                };
                let won = self
                    .store
                    .cas_phase_status(next.id, PhaseStatus::Pending, PhaseStatus::Dispatched, now)
                    .await?;
                if !won {
                    return Ok(());
                }
                let member_ids = self
                    .store
                    .members_of_batch(batch.id)
                    .await?
                    .into_iter()
                    .filter(|m| m.status == MemberStatus::Active)
                    .map(|m| m.id)
                    .collect();
                self.publish(&OrchestratorEvent::PhaseDue(PhaseDueMsg {
                    phase_execution_id: next.id,
                    phase_name: next.phase_name.clone(),
                    batch_id: batch.id,
                    runbook_name: runbook.name.clone(),
                    runbook_version: next.runbook_version,
                    offset_minutes: next.offset_minutes,
                    due_at: next.due_at,
                    member_ids,
                }))
                .await?;
                self.store
                    .set_batch_current_phase(batch.id, Some(next.phase_name.clone()))
                    .await?;
                Ok(())
            }
            BatchStatus::Completed | BatchStatus::Failed => Err(EngineError::InvalidRequest(
                "batch is already terminal".to_string(),
            )),
        }
    }

    /// Cancel a batch: non-terminal steps become `cancelled`, pending
    /// phases `skipped`, dispatched phases `failed`, the batch `failed`.
    pub async fn cancel_batch(&self, id: BatchId) -> Result<(), EngineError> {
        let Some(batch) = self.store.get_batch(id).await? else {
            return Err(EngineError::InvalidRequest(format!("unknown batch {id}")));
        };
        if batch.status.is_terminal() {
            return Err(EngineError::InvalidRequest(
                "batch is already terminal".to_string(),
            ));
        }
        let now = self.clock.now();

        for member in self.store.members_of_batch(batch.id).await? {
            for step in self.store.non_terminal_steps_of_member(member.id).await? {
                self.store
                    .cas_step_status(step.id, step.status, StepStatus::Cancelled, now)
                    .await?;
            }
        }

        if let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? {
            for init in self
                .store
                .inits_of_batch(batch.id, runbook.version)
                .await?
            {
                if !init.status.is_terminal() {
                    self.store
                        .cas_init_status(init.id, init.status, StepStatus::Cancelled, now)
                        .await?;
                }
            }
        }

        for phase in self.store.phases_of_batch(batch.id).await? {
            match phase.status {
                PhaseStatus::Pending => {
                    self.store
                        .cas_phase_status(phase.id, PhaseStatus::Pending, PhaseStatus::Skipped, now)
                        .await?;
                }
                PhaseStatus::Dispatched => {
                    self.store
                        .cas_phase_status(
                            phase.id,
                            PhaseStatus::Dispatched,
                            PhaseStatus::Failed,
                            now,
                        )
                        .await?;
                }
                _ => {}
            }
        }

        self.store
            .cas_batch_status(batch.id, batch.status, BatchStatus::Failed, now)
            .await?;
        tracing::info!(batch = %batch.id, "batch cancelled");
        Ok(())
    }

    // -- members --

    pub async fn list_members(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<convoy_core::BatchMember>, EngineError> {
        Ok(self.store.members_of_batch(batch_id).await?)
    }

    /// Add a member to a batch and announce it so catch-up steps are
    /// created for already-fired phases.
    pub async fn add_member(
        &self,
        batch_id: BatchId,
        columns: HashMap<String, String>,
    ) -> Result<convoy_core::BatchMember, EngineError> {
        let Some(batch) = self.store.get_batch(batch_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "unknown batch {batch_id}"
            )));
        };
        if batch.status.is_terminal() {
            return Err(EngineError::InvalidRequest(
                "batch is already terminal".to_string(),
            ));
        }
        let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "batch {batch_id} has no runbook"
            )));
        };
        let def = parse_runbook(&runbook.document)?;
        let row = SourceRow::new(columns);
        let Some(key) = row.member_key(&def.data_source) else {
            return Err(EngineError::InvalidRequest(format!(
                "payload missing primary key column '{}'",
                def.data_source.primary_key
            )));
        };

        let now = self.clock.now();
        let inserted = self
            .store
            .insert_member(
                NewMember {
                    batch_id,
                    member_key: key.to_string(),
                    data_json: row.freeze(&def.data_source),
                },
                now,
            )
            .await?;
        let Some(member) = inserted else {
            return Err(EngineError::InvalidRequest(format!(
                "member '{key}' already exists in batch {batch_id}"
            )));
        };

        self.publish(&OrchestratorEvent::MemberAdded(MemberEventMsg {
            runbook_name: runbook.name.clone(),
            runbook_version: runbook.version,
            batch_id,
            batch_member_id: member.id,
            member_key: member.member_key.clone(),
        }))
        .await?;
        self.store.mark_member_add_dispatched(member.id, now).await?;
        Ok(member)
    }

    /// Remove a member from a batch and announce it so in-flight work is
    /// cancelled.
    pub async fn remove_member(
        &self,
        batch_id: BatchId,
        member_id: MemberId,
    ) -> Result<(), EngineError> {
        let Some(member) = self.store.get_member(member_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "unknown member {member_id}"
            )));
        };
        if member.batch_id != batch_id {
            return Err(EngineError::InvalidRequest(format!(
                "member {member_id} does not belong to batch {batch_id}"
            )));
        }
        let Some(batch) = self.store.get_batch(batch_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "unknown batch {batch_id}"
            )));
        };
        let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "batch {batch_id} has no runbook"
            )));
        };

        let now = self.clock.now();
        let won = self
            .store
            .cas_member_status(member_id, MemberStatus::Active, MemberStatus::Removed, now)
            .await?;
        if !won {
            return Err(EngineError::InvalidRequest(format!(
                "member {member_id} is not active"
            )));
        }
        self.publish(&OrchestratorEvent::MemberRemoved(MemberEventMsg {
            runbook_name: runbook.name.clone(),
            runbook_version: runbook.version,
            batch_id,
            batch_member_id: member_id,
            member_key: member.member_key.clone(),
        }))
        .await?;
        self.store
            .mark_member_remove_dispatched(member_id, now)
            .await?;
        Ok(())
    }

    async fn load_active_runbook(
        &self,
        name: &str,
    ) -> Result<(Runbook, RunbookDef), EngineError> {
        let Some(runbook) = self.store.get_runbook_by_name(name, None).await? else {
            return Err(EngineError::InvalidRequest(format!(
                "no active runbook named '{name}'"
            )));
        };
        let def = parse_runbook(&runbook.document)?;
        Ok((runbook, def))
    }

    async fn publish(&self, event: &OrchestratorEvent) -> Result<(), EngineError> {
        publish_event(
            self.bus.as_ref(),
            &self.config.topics.orchestrator_events,
            event,
            None,
        )
        .await
    }
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
