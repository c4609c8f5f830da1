// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `phase-due`: create the phase's step executions and dispatch each
//! member's first runnable step

use super::batch_init::step_timings;
use crate::context::{member_context, precreate_params};
use crate::error::EngineError;
use crate::runtime::Orchestrator;
use convoy_bus::Bus;
use convoy_core::{
    Batch, BatchMember, Clock, MemberStatus, PhaseDueMsg, PhaseExecution, PhaseStatus,
    StepExecution, StepStatus,
};
use convoy_runbook::PhaseDef;
use convoy_storage::{NewStepExecution, Store};

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub(crate) async fn handle_phase_due(&self, msg: PhaseDueMsg) -> Result<(), EngineError> {
        let Some(phase) = self
            .store
            .get_phase_execution(msg.phase_execution_id)
            .await?
        else {
            return Err(EngineError::dead_letter(format!(
                "phase-due for unknown phase execution {}",
                msg.phase_execution_id
            )));
        };
        if phase.status.is_terminal() {
            return Ok(());
        }
        let Some(batch) = self.store.get_batch(phase.batch_id).await? else {
            return Err(EngineError::dead_letter(format!(
                "phase execution {} has no batch",
                phase.id
            )));
        };
        // The message carries the version of the phase row being
        // dispatched, which the row itself is authoritative for.
        let (_, def) = self
            .load_runbook(&msg.runbook_name, phase.runbook_version)
            .await?;
        let Some(phase_def) = def.get_phase(&phase.phase_name) else {
            return Err(EngineError::dead_letter(format!(
                "phase '{}' missing from runbook {} v{}",
                phase.phase_name, msg.runbook_name, phase.runbook_version
            )));
        };

        // Redelivery may arrive before the scheduler's CAS is visible;
        // make sure the row is marked dispatched.
        if phase.status == PhaseStatus::Pending {
            let now = self.clock.now();
            self.store
                .cas_phase_status(phase.id, PhaseStatus::Pending, PhaseStatus::Dispatched, now)
                .await?;
        }

        let members = self.store.members_of_batch(batch.id).await?;
        let active: Vec<&BatchMember> = members
            .iter()
            .filter(|m| m.status == MemberStatus::Active)
            .collect();

        // 1. Create step executions (idempotent per phase × member × index).
        let rows = step_rows_for_phase(&def, phase_def, &phase, &batch, &active);
        self.store
            .insert_step_executions(rows, self.clock.now())
            .await?;

        // 2. Dispatch each member's first runnable step, concurrently
        //    across members, strictly ordered within one.
        let steps = self.store.steps_of_phase(phase.id).await?;
        for member in &active {
            self.dispatch_next_step_for_member(
                &steps,
                member,
                &batch,
                &msg.runbook_name,
                phase.runbook_version,
            )
            .await?;
        }

        // A phase dispatched with no members (all removed) can already be
        // judged.
        if steps.is_empty() && active.is_empty() {
            self.check_phase_completion(phase.id).await?;
        }

        self.store
            .set_batch_current_phase(batch.id, Some(phase.phase_name.clone()))
            .await?;
        Ok(())
    }

    /// Dispatch the member's lowest-indexed non-terminal step in this
    /// phase, if it is pending and every earlier step succeeded.
    pub(crate) async fn dispatch_next_step_for_member(
        &self,
        phase_steps: &[StepExecution],
        member: &BatchMember,
        batch: &Batch,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<(), EngineError> {
        let mut mine: Vec<&StepExecution> = phase_steps
            .iter()
            .filter(|s| s.batch_member_id == member.id)
            .collect();
        mine.sort_by_key(|s| s.step_index);

        let Some(next) = mine.iter().find(|s| !s.status.is_terminal()) else {
            return Ok(());
        };
        if next.status != StepStatus::Pending {
            return Ok(());
        }
        // Honor retry backoff; the scheduled retry-check owns redispatch.
        if let Some(retry_after) = next.retry_after {
            if retry_after > self.clock.now() {
                return Ok(());
            }
        }
        let earlier_ok = mine
            .iter()
            .filter(|s| s.step_index < next.step_index)
            .all(|s| s.status == StepStatus::Succeeded);
        if !earlier_ok {
            return Ok(());
        }
        self.dispatch_step(next, member, batch, runbook_name, runbook_version)
            .await?;
        Ok(())
    }
}

fn step_rows_for_phase(
    def: &convoy_runbook::RunbookDef,
    phase_def: &PhaseDef,
    phase: &PhaseExecution,
    batch: &Batch,
    members: &[&BatchMember],
) -> Vec<NewStepExecution> {
    let mut rows = Vec::with_capacity(members.len() * phase_def.steps.len());
    for member in members {
        let vars = member_context(member, batch);
        for (index, step) in phase_def.steps.iter().enumerate() {
            let timings = step_timings(def, step);
            rows.push(NewStepExecution {
                phase_execution_id: phase.id,
                batch_member_id: member.id,
                step_name: step.name.clone(),
                step_index: index as i32,
                worker_id: step.worker_id.clone(),
                function_name: step.function.clone(),
                // Best-effort pre-resolution; placeholders filled by
                // earlier steps' outputs stay raw until dispatch.
                params_json: precreate_params(step, &vars),
                is_poll_step: timings.is_poll_step,
                poll_interval_secs: timings.poll_interval_secs,
                poll_timeout_secs: timings.poll_timeout_secs,
                on_failure: step.on_failure.clone(),
                max_retries: timings.max_retries,
                retry_interval_secs: timings.retry_interval_secs,
            });
        }
    }
    rows
}
