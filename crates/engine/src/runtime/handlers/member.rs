// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `member-added` / `member-removed`

use super::batch_init::step_timings;
use crate::context::{member_context, precreate_params};
use crate::error::EngineError;
use crate::runtime::Orchestrator;
use convoy_bus::Bus;
use convoy_core::{
    Clock, MemberEventMsg, MemberStatus, PhaseExecutionId, PhaseStatus, StepStatus,
};
use convoy_storage::{NewStepExecution, Store};
use std::collections::BTreeSet;

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    /// Catch a late-added member up with every phase that has already
    /// fired, using each phase row's own runbook version (phases may be
    /// on different versions mid-transition).
    pub(crate) async fn handle_member_added(&self, msg: MemberEventMsg) -> Result<(), EngineError> {
        let Some(member) = self.store.get_member(msg.batch_member_id).await? else {
            return Err(EngineError::dead_letter(format!(
                "member-added for unknown member {}",
                msg.batch_member_id
            )));
        };
        if member.status != MemberStatus::Active {
            return Ok(());
        }
        let Some(batch) = self.store.get_batch(member.batch_id).await? else {
            return Ok(());
        };

        let phases = self.store.phases_of_batch(batch.id).await?;
        for phase in phases.iter().filter(|p| {
            matches!(p.status, PhaseStatus::Dispatched | PhaseStatus::Completed)
        }) {
            let (_, def) = self
                .load_runbook(&msg.runbook_name, phase.runbook_version)
                .await?;
            let Some(phase_def) = def.get_phase(&phase.phase_name) else {
                tracing::warn!(
                    phase = %phase.phase_name,
                    version = phase.runbook_version,
                    "phase missing from its runbook version, skipping catch-up"
                );
                continue;
            };

            let vars = member_context(&member, &batch);
            let rows: Vec<NewStepExecution> = phase_def
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| {
                    let timings = step_timings(&def, step);
                    NewStepExecution {
                        phase_execution_id: phase.id,
                        batch_member_id: member.id,
                        step_name: step.name.clone(),
                        step_index: index as i32,
                        worker_id: step.worker_id.clone(),
                        function_name: step.function.clone(),
                        params_json: precreate_params(step, &vars),
                        is_poll_step: timings.is_poll_step,
                        poll_interval_secs: timings.poll_interval_secs,
                        poll_timeout_secs: timings.poll_timeout_secs,
                        on_failure: step.on_failure.clone(),
                        max_retries: timings.max_retries,
                        retry_interval_secs: timings.retry_interval_secs,
                    }
                })
                .collect();
            // Idempotent on (phase_execution_id, batch_member_id, step_index).
            self.store
                .insert_step_executions(rows, self.clock.now())
                .await?;

            let steps = self.store.steps_of_phase(phase.id).await?;
            self.dispatch_next_step_for_member(
                &steps,
                &member,
                &batch,
                &msg.runbook_name,
                phase.runbook_version,
            )
            .await?;
        }
        Ok(())
    }

    /// Cancel the removed member's work and fire the runbook's
    /// `on_member_removed` sequence (fire-and-forget, untracked).
    pub(crate) async fn handle_member_removed(
        &self,
        msg: MemberEventMsg,
    ) -> Result<(), EngineError> {
        let Some(member) = self.store.get_member(msg.batch_member_id).await? else {
            return Err(EngineError::dead_letter(format!(
                "member-removed for unknown member {}",
                msg.batch_member_id
            )));
        };
        let now = self.clock.now();

        let mut touched: BTreeSet<PhaseExecutionId> = BTreeSet::new();
        let remaining = self.store.non_terminal_steps_of_member(member.id).await?;
        for step in &remaining {
            let won = self
                .store
                .cas_step_status(step.id, step.status, StepStatus::Cancelled, now)
                .await?;
            if won {
                touched.insert(step.phase_execution_id);
            }
        }
        if !remaining.is_empty() {
            tracing::info!(
                member = %member.id,
                cancelled = remaining.len(),
                "cancelled steps for removed member"
            );
        }

        // Fire-and-forget removal sequence with the member's last context.
        match self
            .load_runbook(&msg.runbook_name, msg.runbook_version)
            .await
        {
            Ok((_, def)) if !def.on_member_removed.is_empty() => {
                if let Some(batch) = self.store.get_batch(member.batch_id).await? {
                    let vars = member_context(&member, &batch);
                    self.dispatch_fire_and_forget(
                        &def.on_member_removed,
                        &vars,
                        batch.id,
                        "member-removed",
                        &msg.runbook_name,
                        msg.runbook_version,
                    )
                    .await?;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "skipping on_member_removed, runbook unavailable");
            }
        }

        // Cancellation may have finished phases.
        for phase_id in touched {
            self.check_phase_completion(phase_id).await?;
        }
        Ok(())
    }
}
