// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `poll-check`: drive the poll loop of one execution
//!
//! Re-publishes the job as a poll call while time remains, and expires
//! the execution to `poll_timeout` (no retry) when the wall-clock budget
//! from `poll_started_at` runs out. The re-schedule here is a safety net;
//! the worker's own poll responses normally drive the cadence.

use crate::error::EngineError;
use crate::runtime::Orchestrator;
use chrono::Duration;
use convoy_bus::Bus;
use convoy_core::{
    BatchId, Clock, InitExecutionId, JobCorrelationData, JobId, OrchestratorEvent, PollCheckMsg,
    StepExecutionId, StepStatus,
};
use convoy_storage::Store;

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub(crate) async fn handle_poll_check(&self, msg: PollCheckMsg) -> Result<(), EngineError> {
        if let Some(step_id) = msg.step_execution_id {
            self.poll_check_step(step_id, msg.poll_count).await
        } else if let Some(init_id) = msg.init_execution_id {
            self.poll_check_init(init_id, msg.poll_count).await
        } else {
            Err(EngineError::dead_letter(
                "poll-check without an execution id",
            ))
        }
    }

    async fn poll_check_step(
        &self,
        step_id: StepExecutionId,
        poll_count: i32,
    ) -> Result<(), EngineError> {
        let Some(step) = self.store.get_step_execution(step_id).await? else {
            return Ok(());
        };
        if step.status != StepStatus::Polling {
            return Ok(());
        }
        let Some(phase) = self
            .store
            .get_phase_execution(step.phase_execution_id)
            .await?
        else {
            return Ok(());
        };
        let (runbook_name, _) = self.runbook_of_batch(phase.batch_id).await?;
        let runbook_version = phase.runbook_version;

        let now = self.clock.now();
        let timeout = step.poll_timeout_secs.unwrap_or(0);
        let started = step.poll_started_at.unwrap_or(step.updated_at);
        if now - started >= Duration::seconds(timeout) {
            let message = format!("poll timed out after {timeout}s");
            let won = self
                .store
                .fail_step(
                    step.id,
                    StepStatus::Polling,
                    StepStatus::PollTimeout,
                    &message,
                    now,
                )
                .await?;
            if !won {
                return Ok(());
            }
            tracing::warn!(step = %step.id, "poll timeout");
            // Poll timeout does not trigger retry.
            return self
                .on_step_terminal_failure(&step, &runbook_name, runbook_version)
                .await;
        }

        // Still in budget: poke the worker again and re-schedule with a
        // safety margin so the worker-driven cadence normally wins.
        self.publish_poll_call(
            JobId::step_poll(step.id, step.poll_count),
            phase.batch_id,
            &step.worker_id,
            &step.function_name,
            step.params_json.clone(),
            JobCorrelationData {
                step_execution_id: Some(step.id),
                init_execution_id: None,
                is_init_step: false,
                runbook_name,
                runbook_version,
            },
        )
        .await?;

        let interval = step
            .poll_interval_secs
            .unwrap_or(self.config.poll_safety_secs)
            .max(1)
            + self.config.poll_safety_secs;
        let check = OrchestratorEvent::PollCheck(PollCheckMsg {
            step_execution_id: Some(step.id),
            init_execution_id: None,
            poll_count,
        });
        self.publish_event(&check, Some(now + Duration::seconds(interval)))
            .await
    }

    async fn poll_check_init(
        &self,
        init_id: InitExecutionId,
        poll_count: i32,
    ) -> Result<(), EngineError> {
        let Some(init) = self.store.get_init_execution(init_id).await? else {
            return Ok(());
        };
        if init.status != StepStatus::Polling {
            return Ok(());
        }
        let (runbook_name, _) = self.runbook_of_batch(init.batch_id).await?;

        let now = self.clock.now();
        let timeout = init.poll_timeout_secs.unwrap_or(0);
        let started = init.poll_started_at.unwrap_or(init.updated_at);
        if now - started >= Duration::seconds(timeout) {
            let message = format!("poll timed out after {timeout}s");
            let won = self
                .store
                .fail_init(
                    init.id,
                    StepStatus::Polling,
                    StepStatus::PollTimeout,
                    &message,
                    now,
                )
                .await?;
            if !won {
                return Ok(());
            }
            tracing::warn!(init = %init.id, "init poll timeout");
            return self
                .on_init_terminal_failure(&init, &runbook_name, init.runbook_version)
                .await;
        }

        self.publish_poll_call(
            JobId::init_poll(init.id, init.poll_count),
            init.batch_id,
            &init.worker_id,
            &init.function_name,
            init.params_json.clone(),
            JobCorrelationData {
                step_execution_id: None,
                init_execution_id: Some(init.id),
                is_init_step: true,
                runbook_name,
                runbook_version: init.runbook_version,
            },
        )
        .await?;

        let interval = init
            .poll_interval_secs
            .unwrap_or(self.config.poll_safety_secs)
            .max(1)
            + self.config.poll_safety_secs;
        let check = OrchestratorEvent::PollCheck(PollCheckMsg {
            step_execution_id: None,
            init_execution_id: Some(init.id),
            poll_count,
        });
        self.publish_event(&check, Some(now + Duration::seconds(interval)))
            .await
    }

    /// Runbook name (and active version) owning a batch, for correlation
    /// data on re-published jobs.
    async fn runbook_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<(String, Option<i32>), EngineError> {
        let Some(batch) = self.store.get_batch(batch_id).await? else {
            return Ok((String::new(), None));
        };
        let runbook = self.store.get_runbook(batch.runbook_id).await?;
        Ok((
            runbook.as_ref().map(|r| r.name.clone()).unwrap_or_default(),
            runbook.map(|r| r.version),
        ))
    }
}
