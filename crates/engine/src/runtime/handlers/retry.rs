// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `retry-check`: fire a delayed retry
//!
//! The message carries the retry count it was scheduled for; a mismatch
//! (or a row no longer pending) means the step was cancelled or
//! superseded in the meantime, and the check is dropped.

use crate::error::EngineError;
use crate::runtime::Orchestrator;
use convoy_bus::Bus;
use convoy_core::{Clock, RetryCheckMsg, StepStatus};
use convoy_storage::Store;

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub(crate) async fn handle_retry_check(&self, msg: RetryCheckMsg) -> Result<(), EngineError> {
        if let Some(step_id) = msg.step_execution_id {
            let Some(step) = self.store.get_step_execution(step_id).await? else {
                return Ok(());
            };
            if step.status != StepStatus::Pending || step.retry_count != msg.retry_count {
                tracing::debug!(step = %step.id, "stale retry-check, dropping");
                return Ok(());
            }
            let Some(member) = self.store.get_member(step.batch_member_id).await? else {
                return Ok(());
            };
            let Some(batch) = self.store.get_batch(member.batch_id).await? else {
                return Ok(());
            };
            let Some(phase) = self
                .store
                .get_phase_execution(step.phase_execution_id)
                .await?
            else {
                return Ok(());
            };
            let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? else {
                return Ok(());
            };
            self.dispatch_step(&step, &member, &batch, &runbook.name, phase.runbook_version)
                .await?;
            Ok(())
        } else if let Some(init_id) = msg.init_execution_id {
            let Some(init) = self.store.get_init_execution(init_id).await? else {
                return Ok(());
            };
            if init.status != StepStatus::Pending || init.retry_count != msg.retry_count {
                tracing::debug!(init = %init.id, "stale retry-check, dropping");
                return Ok(());
            }
            let Some(batch) = self.store.get_batch(init.batch_id).await? else {
                return Ok(());
            };
            let Some(runbook) = self.store.get_runbook(batch.runbook_id).await? else {
                return Ok(());
            };
            self.dispatch_init(&init, &batch, &runbook.name, init.runbook_version)
                .await?;
            Ok(())
        } else {
            Err(EngineError::dead_letter(
                "retry-check without an execution id",
            ))
        }
    }
}
