// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `batch-init`: create init executions and start the sequential chain

use crate::context::precreate_params;
use crate::error::EngineError;
use crate::runtime::Orchestrator;
use convoy_bus::Bus;
use convoy_core::{Batch, BatchInitMsg, BatchStatus, Clock, StepStatus};
use convoy_runbook::{parse_duration_secs, RunbookDef, StepDef};
use convoy_storage::{NewInitExecution, Store};

/// Parsed poll/retry numbers shared by step and init row construction.
pub(crate) struct StepTimings {
    pub is_poll_step: bool,
    pub poll_interval_secs: Option<i64>,
    pub poll_timeout_secs: Option<i64>,
    pub max_retries: i32,
    pub retry_interval_secs: i64,
}

/// Extract timings from a validated step definition.
///
/// Durations were checked at publish time; a failure here means the
/// stored document drifted, so fall back to conservative zeros.
pub(crate) fn step_timings(def: &RunbookDef, step: &StepDef) -> StepTimings {
    let retry = def.effective_retry(step);
    StepTimings {
        is_poll_step: step.poll.is_some(),
        poll_interval_secs: step
            .poll
            .as_ref()
            .and_then(|p| parse_duration_secs(&p.interval).ok()),
        poll_timeout_secs: step
            .poll
            .as_ref()
            .and_then(|p| parse_duration_secs(&p.timeout).ok()),
        max_retries: retry.max_retries,
        retry_interval_secs: parse_duration_secs(&retry.interval).unwrap_or(0),
    }
}

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub(crate) async fn handle_batch_init(&self, msg: BatchInitMsg) -> Result<(), EngineError> {
        let Some(batch) = self.store.get_batch(msg.batch_id).await? else {
            return Err(EngineError::dead_letter(format!(
                "batch-init for unknown batch {}",
                msg.batch_id
            )));
        };
        if batch.status.is_terminal() {
            return Ok(());
        }
        let (_, def) = self
            .load_runbook(&msg.runbook_name, msg.runbook_version)
            .await?;

        if def.init.is_empty() {
            if batch.status == BatchStatus::Detected {
                let now = self.clock.now();
                self.store
                    .cas_batch_status(batch.id, BatchStatus::Detected, BatchStatus::Active, now)
                    .await?;
            }
            return Ok(());
        }

        // Idempotent: skipped entirely when rows exist for this version.
        let rows = init_rows(&def, msg.runbook_version, &batch);
        self.store
            .insert_init_executions(rows, self.clock.now())
            .await?;

        self.advance_init_chain(&batch, &msg.runbook_name, msg.runbook_version, &def)
            .await
    }

    /// Dispatch the lowest-indexed init step when it is pending and every
    /// earlier one succeeded; transition the batch when the chain is done.
    pub(crate) async fn advance_init_chain(
        &self,
        batch: &Batch,
        runbook_name: &str,
        runbook_version: i32,
        _def: &RunbookDef,
    ) -> Result<(), EngineError> {
        let inits = self
            .store
            .inits_of_batch(batch.id, runbook_version)
            .await?;

        let next = inits.iter().find(|i| !i.status.is_terminal());
        match next {
            Some(init) if init.status == StepStatus::Pending => {
                let earlier_ok = inits
                    .iter()
                    .filter(|i| i.step_index < init.step_index)
                    .all(|i| i.status == StepStatus::Succeeded);
                if !earlier_ok {
                    // An earlier init failed; the failure path owns the
                    // batch transition.
                    return Ok(());
                }
                let outcome = self
                    .dispatch_init(init, batch, runbook_name, runbook_version)
                    .await?;
                if outcome == crate::runtime::DispatchOutcome::Dispatched
                    && batch.status == BatchStatus::Detected
                {
                    let now = self.clock.now();
                    self.store
                        .cas_batch_status(
                            batch.id,
                            BatchStatus::Detected,
                            BatchStatus::InitDispatched,
                            now,
                        )
                        .await?;
                }
                Ok(())
            }
            Some(_) => Ok(()), // dispatched or polling; results drive it
            None => {
                // Whole chain succeeded (or no rows at all).
                let all_succeeded =
                    !inits.is_empty() && inits.iter().all(|i| i.status == StepStatus::Succeeded);
                if !all_succeeded {
                    return Ok(());
                }
                let now = self.clock.now();
                let from = match batch.status {
                    BatchStatus::InitDispatched => BatchStatus::InitDispatched,
                    BatchStatus::Detected => BatchStatus::Detected,
                    _ => return Ok(()),
                };
                self.store
                    .cas_batch_status(batch.id, from, BatchStatus::Active, now)
                    .await?;
                tracing::info!(batch = %batch.id, "init chain complete, batch active");
                Ok(())
            }
        }
    }
}

fn init_rows(def: &RunbookDef, runbook_version: i32, batch: &Batch) -> Vec<NewInitExecution> {
    let vars = crate::context::init_context(batch);
    def.init
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let timings = step_timings(def, step);
            NewInitExecution {
                batch_id: batch.id,
                runbook_version,
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
        .collect()
}
