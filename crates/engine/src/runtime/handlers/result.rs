// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `worker-result`: the result processor
//!
//! Routes a worker's outcome back to its execution row via the
//! correlation data, then advances the member, schedules a poll or retry
//! check, or runs the failure path. Late duplicates land on terminal rows
//! and are ignored.

use crate::error::EngineError;
use crate::runtime::Orchestrator;
use chrono::Duration;
use convoy_bus::Bus;
use convoy_core::{
    Clock, InitExecution, JobCorrelationData, OrchestratorEvent, PollCheckMsg, RetryCheckMsg,
    StepExecution, StepStatus, WorkerResult, WorkerResultStatus,
};
use convoy_storage::Store;
use serde_json::Value;

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub(crate) async fn handle_worker_result(
        &self,
        result: WorkerResult,
    ) -> Result<(), EngineError> {
        let Some(correlation) = result.correlation_data.clone() else {
            return Err(EngineError::dead_letter("MissingCorrelationData"));
        };
        match (&correlation.step_execution_id, &correlation.init_execution_id) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(EngineError::dead_letter(
                    "InvalidCorrelationData: exactly one execution id required",
                ));
            }
            _ => {}
        }

        if let Some(step_id) = correlation.step_execution_id {
            let Some(step) = self.store.get_step_execution(step_id).await? else {
                return Err(EngineError::dead_letter(format!(
                    "InvalidCorrelationData: unknown step execution {step_id}"
                )));
            };
            self.process_step_result(step, result, &correlation).await
        } else if let Some(init_id) = correlation.init_execution_id {
            let Some(init) = self.store.get_init_execution(init_id).await? else {
                return Err(EngineError::dead_letter(format!(
                    "InvalidCorrelationData: unknown init execution {init_id}"
                )));
            };
            self.process_init_result(init, result, &correlation).await
        } else {
            Ok(())
        }
    }

    async fn process_step_result(
        &self,
        step: StepExecution,
        result: WorkerResult,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        if step.status.is_terminal() {
            tracing::debug!(step = %step.id, "late duplicate result, ignoring");
            return Ok(());
        }

        if step.is_poll_step {
            match result.poll_result() {
                Some(poll) if !poll.complete => {
                    return self.step_poll_in_progress(&step, correlation).await;
                }
                Some(poll) => {
                    return self
                        .step_succeeded(&step, poll.data.as_ref(), correlation)
                        .await;
                }
                None => {
                    if result.status == WorkerResultStatus::Failure {
                        return self
                            .step_failed(&step, &result.error_message(), correlation)
                            .await;
                    }
                    return Err(EngineError::dead_letter(format!(
                        "unrecognized poll result shape for step {}",
                        step.id
                    )));
                }
            }
        }

        match result.status {
            WorkerResultStatus::Success => {
                self.step_succeeded(&step, result.result.as_ref(), correlation)
                    .await
            }
            WorkerResultStatus::Failure => {
                self.step_failed(&step, &result.error_message(), correlation)
                    .await
            }
        }
    }

    async fn step_succeeded(
        &self,
        step: &StepExecution,
        outputs_from: Option<&Value>,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let won = self
            .store
            .succeed_step(step.id, step.status, outputs_from.cloned(), now)
            .await?;
        if !won {
            return Ok(());
        }
        tracing::info!(step = %step.id, member = %step.batch_member_id, "step succeeded");

        let (_, def) = self
            .load_runbook(&correlation.runbook_name, correlation.runbook_version)
            .await?;

        // Pick declared outputs into the member's worker data (new wins).
        let Some(phase) = self
            .store
            .get_phase_execution(step.phase_execution_id)
            .await?
        else {
            return Ok(());
        };
        if let Some(step_def) = def
            .get_phase(&phase.phase_name)
            .and_then(|p| p.get_step(&step.step_name))
        {
            if !step_def.output_params.is_empty() {
                let mut updates = serde_json::Map::new();
                let source = outputs_from.and_then(|v| v.as_object());
                for (var_name, field) in &step_def.output_params {
                    match source.and_then(|o| o.get(field)) {
                        Some(value) => {
                            updates.insert(var_name.clone(), value.clone());
                        }
                        None => {
                            tracing::warn!(
                                step = %step.id,
                                output = %field,
                                "declared output missing from result"
                            );
                        }
                    }
                }
                if !updates.is_empty() {
                    self.store
                        .merge_worker_data(step.batch_member_id, updates)
                        .await?;
                }
            }
        }

        // Advance: next step for this member, or completion checks.
        let steps = self.store.steps_of_phase(step.phase_execution_id).await?;
        let member_done = steps
            .iter()
            .filter(|s| s.batch_member_id == step.batch_member_id)
            .all(|s| s.status.is_terminal());
        if member_done {
            return self.check_phase_completion(step.phase_execution_id).await;
        }
        let Some(member) = self.store.get_member(step.batch_member_id).await? else {
            return Ok(());
        };
        let Some(batch) = self.store.get_batch(member.batch_id).await? else {
            return Ok(());
        };
        self.dispatch_next_step_for_member(
            &steps,
            &member,
            &batch,
            &correlation.runbook_name,
            correlation.runbook_version,
        )
        .await
    }

    async fn step_poll_in_progress(
        &self,
        step: &StepExecution,
        _correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let won = self
            .store
            .step_poll_bookkeeping(step.id, step.status, now)
            .await?;
        if !won {
            return Ok(());
        }
        let interval = step
            .poll_interval_secs
            .unwrap_or(self.config.poll_safety_secs)
            .max(1);
        let check = OrchestratorEvent::PollCheck(PollCheckMsg {
            step_execution_id: Some(step.id),
            init_execution_id: None,
            poll_count: step.poll_count + 1,
        });
        self.publish_event(&check, Some(now + Duration::seconds(interval)))
            .await
    }

    async fn step_failed(
        &self,
        step: &StepExecution,
        error: &str,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        if step.retry_count < step.max_retries {
            let retry_after = now + Duration::seconds(step.retry_interval_secs.max(0));
            let won = self
                .store
                .step_retry_bookkeeping(step.id, step.status, retry_after, now)
                .await?;
            if !won {
                return Ok(());
            }
            tracing::info!(
                step = %step.id,
                attempt = step.retry_count + 1,
                of = step.max_retries,
                "step failed, retry scheduled"
            );
            let check = OrchestratorEvent::RetryCheck(RetryCheckMsg {
                step_execution_id: Some(step.id),
                init_execution_id: None,
                retry_count: step.retry_count + 1,
            });
            return self.publish_event(&check, Some(retry_after)).await;
        }

        let won = self
            .store
            .fail_step(step.id, step.status, StepStatus::Failed, error, now)
            .await?;
        if !won {
            return Ok(());
        }
        tracing::warn!(step = %step.id, error, "step failed terminally");
        self.on_step_terminal_failure(
            step,
            &correlation.runbook_name,
            correlation.runbook_version,
        )
        .await
    }

    async fn process_init_result(
        &self,
        init: InitExecution,
        result: WorkerResult,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        if init.status.is_terminal() {
            tracing::debug!(init = %init.id, "late duplicate result, ignoring");
            return Ok(());
        }

        if init.is_poll_step {
            match result.poll_result() {
                Some(poll) if !poll.complete => {
                    return self.init_poll_in_progress(&init).await;
                }
                Some(poll) => {
                    return self.init_succeeded(&init, poll.data.as_ref(), correlation).await;
                }
                None => {
                    if result.status == WorkerResultStatus::Failure {
                        return self
                            .init_failed(&init, &result.error_message(), correlation)
                            .await;
                    }
                    return Err(EngineError::dead_letter(format!(
                        "unrecognized poll result shape for init {}",
                        init.id
                    )));
                }
            }
        }

        match result.status {
            WorkerResultStatus::Success => {
                self.init_succeeded(&init, result.result.as_ref(), correlation)
                    .await
            }
            WorkerResultStatus::Failure => {
                self.init_failed(&init, &result.error_message(), correlation)
                    .await
            }
        }
    }

    async fn init_succeeded(
        &self,
        init: &InitExecution,
        result_body: Option<&Value>,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let won = self
            .store
            .succeed_init(init.id, init.status, result_body.cloned(), now)
            .await?;
        if !won {
            return Ok(());
        }
        tracing::info!(init = %init.id, batch = %init.batch_id, "init step succeeded");

        let Some(batch) = self.store.get_batch(init.batch_id).await? else {
            return Ok(());
        };
        let (_, def) = self
            .load_runbook(&correlation.runbook_name, correlation.runbook_version)
            .await?;
        self.advance_init_chain(
            &batch,
            &correlation.runbook_name,
            correlation.runbook_version,
            &def,
        )
        .await
    }

    async fn init_poll_in_progress(&self, init: &InitExecution) -> Result<(), EngineError> {
        let now = self.clock.now();
        let won = self
            .store
            .init_poll_bookkeeping(init.id, init.status, now)
            .await?;
        if !won {
            return Ok(());
        }
        let interval = init
            .poll_interval_secs
            .unwrap_or(self.config.poll_safety_secs)
            .max(1);
        let check = OrchestratorEvent::PollCheck(PollCheckMsg {
            step_execution_id: None,
            init_execution_id: Some(init.id),
            poll_count: init.poll_count + 1,
        });
        self.publish_event(&check, Some(now + Duration::seconds(interval)))
            .await
    }

    async fn init_failed(
        &self,
        init: &InitExecution,
        error: &str,
        correlation: &JobCorrelationData,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        if init.retry_count < init.max_retries {
            let retry_after = now + Duration::seconds(init.retry_interval_secs.max(0));
            let won = self
                .store
                .init_retry_bookkeeping(init.id, init.status, retry_after, now)
                .await?;
            if !won {
                return Ok(());
            }
            let check = OrchestratorEvent::RetryCheck(RetryCheckMsg {
                step_execution_id: None,
                init_execution_id: Some(init.id),
                retry_count: init.retry_count + 1,
            });
            return self.publish_event(&check, Some(retry_after)).await;
        }

        let won = self
            .store
            .fail_init(init.id, init.status, StepStatus::Failed, error, now)
            .await?;
        if !won {
            return Ok(());
        }
        tracing::warn!(init = %init.id, error, "init step failed terminally");
        self.on_init_terminal_failure(
            init,
            &correlation.runbook_name,
            correlation.runbook_version,
        )
        .await
    }
}
