// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase and batch completion checks, and the shared terminal-failure path

use crate::context::member_context;
use crate::error::EngineError;
use crate::runtime::Orchestrator;
use convoy_bus::Bus;
use convoy_core::{
    BatchId, BatchStatus, Clock, InitExecution, MemberStatus, PhaseExecutionId, PhaseStatus,
    StepExecution, StepStatus,
};
use convoy_storage::Store;
use std::collections::{BTreeSet, HashMap};

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    /// Advance a phase to `completed`/`failed` once every step is
    /// terminal, then check the batch.
    ///
    /// A phase completes when at least one member finished every step
    /// `succeeded`; otherwise it fails. Phases that ended up with no steps
    /// at all (every member removed before dispatch) fail by the same
    /// rule.
    pub(crate) async fn check_phase_completion(
        &self,
        phase_id: PhaseExecutionId,
    ) -> Result<(), EngineError> {
        let Some(phase) = self.store.get_phase_execution(phase_id).await? else {
            return Ok(());
        };
        if phase.status.is_terminal() {
            return Ok(());
        }
        let steps = self.store.steps_of_phase(phase_id).await?;
        if steps.iter().any(|s| !s.status.is_terminal()) {
            return Ok(());
        }

        let mut per_member: HashMap<_, Vec<&StepExecution>> = HashMap::new();
        for step in &steps {
            per_member.entry(step.batch_member_id).or_default().push(step);
        }
        let any_member_succeeded = per_member
            .values()
            .any(|steps| steps.iter().all(|s| s.status == StepStatus::Succeeded));

        let to = if any_member_succeeded {
            PhaseStatus::Completed
        } else {
            PhaseStatus::Failed
        };
        let now = self.clock.now();
        let won = self
            .store
            .cas_phase_status(phase_id, PhaseStatus::Dispatched, to, now)
            .await?;
        if !won {
            return Ok(());
        }
        tracing::info!(phase = %phase_id, batch = %phase.batch_id, status = %to, "phase finished");
        self.check_batch_completion(phase.batch_id).await
    }

    /// Advance the batch once every phase is terminal: `completed` when
    /// any phase completed, else `failed`.
    pub(crate) async fn check_batch_completion(&self, batch_id: BatchId) -> Result<(), EngineError> {
        let phases = self.store.phases_of_batch(batch_id).await?;
        if phases.is_empty() || phases.iter().any(|p| !p.status.is_terminal()) {
            return Ok(());
        }
        let any_completed = phases.iter().any(|p| p.status == PhaseStatus::Completed);
        let to = if any_completed {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        };
        let now = self.clock.now();
        let won = self
            .store
            .cas_batch_status(batch_id, BatchStatus::Active, to, now)
            .await?;
        if won {
            tracing::info!(batch = %batch_id, status = %to, "batch finished");
        }
        Ok(())
    }

    /// Everything that follows a step reaching `failed`/`poll_timeout`:
    /// fire the rollback sequence, cancel the member's remaining pending
    /// steps, mark the member failed, and run completion checks for every
    /// phase that changed.
    pub(crate) async fn on_step_terminal_failure(
        &self,
        step: &StepExecution,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();

        // Rollback sequence, fire-and-forget, same context as the step.
        if let Some(rollback_name) = &step.on_failure {
            let member = self.store.get_member(step.batch_member_id).await?;
            if let Some(member) = &member {
                if let Some(batch) = self.store.get_batch(member.batch_id).await? {
                    match self.load_runbook(runbook_name, runbook_version).await {
                        Ok((_, def)) => {
                            if let Some(steps) = def.get_rollback(rollback_name) {
                                let vars = member_context(member, &batch);
                                self.dispatch_fire_and_forget(
                                    steps,
                                    &vars,
                                    batch.id,
                                    "rollback",
                                    runbook_name,
                                    runbook_version,
                                )
                                .await?;
                            } else {
                                tracing::warn!(
                                    rollback = %rollback_name,
                                    "rollback sequence missing from runbook"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping rollback, runbook unavailable");
                        }
                    }
                }
            }
        }

        // Cancel the member's remaining pending steps, in this and later
        // phases.
        let mut touched: BTreeSet<PhaseExecutionId> = BTreeSet::new();
        touched.insert(step.phase_execution_id);
        let remaining = self
            .store
            .non_terminal_steps_of_member(step.batch_member_id)
            .await?;
        for pending in remaining
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
        {
            let won = self
                .store
                .cas_step_status(pending.id, StepStatus::Pending, StepStatus::Cancelled, now)
                .await?;
            if won {
                touched.insert(pending.phase_execution_id);
            }
        }

        let _ = self
            .store
            .cas_member_status(
                step.batch_member_id,
                MemberStatus::Active,
                MemberStatus::Failed,
                now,
            )
            .await?;
        tracing::warn!(
            member = %step.batch_member_id,
            step = %step.id,
            "member failed"
        );

        for phase_id in touched {
            self.check_phase_completion(phase_id).await?;
        }
        Ok(())
    }

    /// Everything that follows an init step reaching a terminal failure:
    /// fire the rollback sequence and fail the batch.
    pub(crate) async fn on_init_terminal_failure(
        &self,
        init: &InitExecution,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(batch) = self.store.get_batch(init.batch_id).await? else {
            return Ok(());
        };

        if let Some(rollback_name) = &init.on_failure {
            match self.load_runbook(runbook_name, runbook_version).await {
                Ok((_, def)) => {
                    if let Some(steps) = def.get_rollback(rollback_name) {
                        let vars = crate::context::init_context(&batch);
                        self.dispatch_fire_and_forget(
                            steps,
                            &vars,
                            batch.id,
                            "rollback",
                            runbook_name,
                            runbook_version,
                        )
                        .await?;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping rollback, runbook unavailable");
                }
            }
        }

        if batch.status.can_transition(BatchStatus::Failed) {
            let won = self
                .store
                .cas_batch_status(batch.id, batch.status, BatchStatus::Failed, now)
                .await?;
            if won {
                tracing::warn!(batch = %batch.id, init = %init.id, "batch failed during init");
            }
        }
        Ok(())
    }
}
