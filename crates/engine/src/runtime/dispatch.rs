// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker job dispatch
//!
//! Jobs are addressed by the `WorkerId` property and carry a
//! deterministic job id derived from the execution row and its
//! retry/poll state; the jobs topic's duplicate-detection window turns
//! redelivered handler work into no-ops.

use super::Orchestrator;
use crate::context::{init_context, member_context, resolve_params};
use crate::error::EngineError;
use convoy_bus::{Bus, OutboundMessage, PropertyFilter};
use convoy_core::{
    Batch, BatchId, BatchMember, Clock, InitExecution, JobCorrelationData, JobId, StepExecution,
    StepStatus, WorkerJob, WorkerRoute, MESSAGE_TYPE_PROP, WORKER_ID_PROP,
};
use convoy_runbook::StepDef;
use convoy_storage::Store;
use std::collections::HashMap;

/// What came of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// The job is on the bus.
    Dispatched,
    /// Another handler won the CAS first.
    Lost,
    /// Template resolution failed; the row is now terminal `failed`.
    FailedResolution,
}

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    /// Resolve, CAS to `dispatched`, and publish one member step.
    ///
    /// On unresolvable parameters the step fails terminally and the
    /// member-failure path runs (rollback, cancellation, completion
    /// checks).
    pub(crate) async fn dispatch_step(
        &self,
        step: &StepExecution,
        member: &BatchMember,
        batch: &Batch,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<DispatchOutcome, EngineError> {
        let now = self.clock.now();
        let vars = member_context(member, batch);
        let params = match resolve_params(&step.params_json, &vars) {
            Ok(params) => params,
            Err(e) => {
                let message = e.to_string();
                let won = self
                    .store
                    .fail_step(step.id, step.status, StepStatus::Failed, &message, now)
                    .await?;
                if won {
                    tracing::warn!(
                        step = %step.id,
                        member = %member.id,
                        error = %message,
                        "step failed at dispatch"
                    );
                    self.on_step_terminal_failure(step, runbook_name, runbook_version)
                        .await?;
                }
                return Ok(DispatchOutcome::FailedResolution);
            }
        };

        let job_id = JobId::step(step.id, step.retry_count);
        let won = self
            .store
            .mark_step_dispatched(step.id, step.status, &job_id, params.clone(), now)
            .await?;
        if !won {
            return Ok(DispatchOutcome::Lost);
        }

        let job = WorkerJob {
            job_id,
            batch_id: batch.id,
            worker_id: WorkerRoute::resolve(&step.worker_id).worker_id().to_string(),
            function_name: step.function_name.clone(),
            parameters: params,
            correlation_data: JobCorrelationData {
                step_execution_id: Some(step.id),
                init_execution_id: None,
                is_init_step: false,
                runbook_name: runbook_name.to_string(),
                runbook_version,
            },
            is_poll_call: false,
        };
        self.publish_worker_job(&job).await?;
        tracing::info!(
            step = %step.id,
            job = %job.job_id,
            worker = %job.worker_id,
            function = %job.function_name,
            "step dispatched"
        );
        Ok(DispatchOutcome::Dispatched)
    }

    /// Resolve, CAS to `dispatched`, and publish one init step.
    pub(crate) async fn dispatch_init(
        &self,
        init: &InitExecution,
        batch: &Batch,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<DispatchOutcome, EngineError> {
        let now = self.clock.now();
        let vars = init_context(batch);
        let params = match resolve_params(&init.params_json, &vars) {
            Ok(params) => params,
            Err(e) => {
                let message = e.to_string();
                let won = self
                    .store
                    .fail_init(init.id, init.status, StepStatus::Failed, &message, now)
                    .await?;
                if won {
                    tracing::warn!(init = %init.id, error = %message, "init failed at dispatch");
                    self.on_init_terminal_failure(init, runbook_name, runbook_version)
                        .await?;
                }
                return Ok(DispatchOutcome::FailedResolution);
            }
        };

        let job_id = JobId::init(init.id, init.retry_count);
        let won = self
            .store
            .mark_init_dispatched(init.id, init.status, &job_id, params.clone(), now)
            .await?;
        if !won {
            return Ok(DispatchOutcome::Lost);
        }

        let job = WorkerJob {
            job_id,
            batch_id: batch.id,
            worker_id: WorkerRoute::resolve(&init.worker_id).worker_id().to_string(),
            function_name: init.function_name.clone(),
            parameters: params,
            correlation_data: JobCorrelationData {
                step_execution_id: None,
                init_execution_id: Some(init.id),
                is_init_step: true,
                runbook_name: runbook_name.to_string(),
                runbook_version,
            },
            is_poll_call: false,
        };
        self.publish_worker_job(&job).await?;
        tracing::info!(init = %init.id, job = %job.job_id, "init step dispatched");
        Ok(DispatchOutcome::Dispatched)
    }

    /// Re-publish an already-dispatched job as a poll call.
    pub(crate) async fn publish_poll_call(
        &self,
        job_id: JobId,
        batch_id: BatchId,
        worker_id: &str,
        function_name: &str,
        parameters: HashMap<String, String>,
        correlation_data: JobCorrelationData,
    ) -> Result<(), EngineError> {
        let job = WorkerJob {
            job_id,
            batch_id,
            worker_id: WorkerRoute::resolve(worker_id).worker_id().to_string(),
            function_name: function_name.to_string(),
            parameters,
            correlation_data,
            is_poll_call: true,
        };
        self.publish_worker_job(&job).await
    }

    /// Dispatch a fire-and-forget sequence (rollbacks, member-removed
    /// steps): no execution rows, no status tracking, lenient resolution.
    pub(crate) async fn dispatch_fire_and_forget(
        &self,
        steps: &[StepDef],
        vars: &HashMap<String, String>,
        batch_id: BatchId,
        kind: &str,
        runbook_name: &str,
        runbook_version: i32,
    ) -> Result<(), EngineError> {
        for step in steps {
            let parameters: HashMap<String, String> = step
                .params
                .iter()
                .map(|(k, v)| (k.clone(), convoy_runbook::resolve_lenient(v, vars)))
                .collect();
            let job = WorkerJob {
                job_id: JobId::fire_and_forget(kind, &uuid::Uuid::new_v4().to_string()),
                batch_id,
                worker_id: WorkerRoute::resolve(&step.worker_id).worker_id().to_string(),
                function_name: step.function.clone(),
                parameters,
                correlation_data: JobCorrelationData {
                    step_execution_id: None,
                    init_execution_id: None,
                    is_init_step: false,
                    runbook_name: runbook_name.to_string(),
                    runbook_version,
                },
                is_poll_call: false,
            };
            self.publish_worker_job(&job).await?;
            tracing::info!(
                kind,
                job = %job.job_id,
                function = %job.function_name,
                "fire-and-forget step dispatched"
            );
        }
        Ok(())
    }

    async fn publish_worker_job(&self, job: &WorkerJob) -> Result<(), EngineError> {
        // Defensive: the worker's subscription normally exists already.
        self.bus
            .ensure_subscription(
                &self.config.topics.worker_jobs,
                &job.worker_id,
                Some(PropertyFilter::new(WORKER_ID_PROP, job.worker_id.clone())),
            )
            .await?;

        let message = OutboundMessage::json(serde_json::to_value(job)?)
            .with_property(MESSAGE_TYPE_PROP, "worker-job")
            .with_property(WORKER_ID_PROP, job.worker_id.clone())
            .with_message_id(job.job_id.as_str());
        self.bus
            .publish(&self.config.topics.worker_jobs, message)
            .await?;
        Ok(())
    }
}
