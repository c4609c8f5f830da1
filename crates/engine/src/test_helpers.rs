// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test harness: MemStore + MemoryBus + FakeClock + FakeSource
//! wired into an orchestrator, scheduler, and admin surface.

use crate::{Admin, EngineConfig, Orchestrator, Scheduler};
use chrono::{DateTime, TimeZone, Utc};
use convoy_adapters::{FakeSource, SourceRow};
use convoy_bus::{Bus, Disposition, PropertyFilter};
use convoy_core::{
    Clock, FakeClock, JobCorrelationData, OverdueBehavior, Runbook, WorkerError, WorkerJob,
    WorkerResult, WorkerResultStatus, WORKER_ID_PROP,
};
use convoy_runbook::Format;
use convoy_storage::{LeaseLock, MemLeaseLock, MemStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;

pub(crate) type TestBus = convoy_bus::MemoryBus<FakeClock>;
pub(crate) type TestOrchestrator = Orchestrator<MemStore, TestBus, FakeClock>;
pub(crate) type TestScheduler =
    Scheduler<MemStore, TestBus, FakeSource, MemLeaseLock, FakeClock>;
pub(crate) type TestAdmin = Admin<MemStore, TestBus, FakeClock>;

pub(crate) struct Harness {
    pub store: Arc<MemStore>,
    pub bus: Arc<TestBus>,
    pub clock: FakeClock,
    pub source: Arc<FakeSource>,
    pub lock: Arc<MemLeaseLock>,
    pub config: Arc<EngineConfig>,
    pub orchestrator: Arc<TestOrchestrator>,
    pub scheduler: Arc<TestScheduler>,
    pub admin: TestAdmin,
}

/// Default test epoch: 2030-01-01T00:00:00Z.
pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

impl Harness {
    pub async fn new() -> Self {
        let clock = FakeClock::at(t0());
        let store = Arc::new(MemStore::new());
        let bus = Arc::new(TestBus::new(clock.clone()));
        let source = Arc::new(FakeSource::new());
        let lock = Arc::new(MemLeaseLock::new());
        let config = Arc::new(EngineConfig::default());

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone(),
            Arc::clone(&config),
        ));
        orchestrator.setup().await.unwrap();

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&source),
            Arc::clone(&lock),
            clock.clone(),
            Arc::clone(&config),
        ));
        let admin = Admin::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone(),
            Arc::clone(&config),
        );

        Self {
            store,
            bus,
            clock,
            source,
            lock,
            config,
            orchestrator,
            scheduler,
            admin,
        }
    }

    /// Publish a TOML runbook and enable its automation.
    pub async fn publish(&self, document: &str) -> Runbook {
        self.publish_with(document, OverdueBehavior::Rerun, false).await
    }

    pub async fn publish_with(
        &self,
        document: &str,
        overdue: OverdueBehavior,
        rerun_init: bool,
    ) -> Runbook {
        let runbook = self
            .admin
            .publish_runbook(document, Format::Toml, overdue, rerun_init)
            .await
            .unwrap();
        self.admin
            .set_automation(&runbook.name, true, "tests")
            .await
            .unwrap();
        runbook
    }

    /// Run one scheduler tick and process every resulting event.
    pub async fn tick(&self) {
        self.scheduler.tick().await.unwrap();
        self.pump().await;
    }

    /// Process orchestrator events until the subscription runs dry.
    /// Returns how many messages were handled.
    pub async fn pump(&self) -> usize {
        let topic = self.config.topics.orchestrator_events.clone();
        let mut handled = 0;
        loop {
            let delivery = self
                .bus
                .receive(&topic, &self.config.subscription, StdDuration::ZERO)
                .await
                .unwrap();
            let Some(delivery) = delivery else {
                break;
            };
            let outcome = self.orchestrator.handle_event_message(&delivery).await;
            let disposition = match outcome {
                Ok(()) => Disposition::Complete,
                Err(e) => e.disposition(),
            };
            self.bus.settle(&delivery, disposition).await.unwrap();
            handled += 1;
        }
        handled
    }

    /// Drain every job currently waiting for the given worker.
    pub async fn take_jobs(&self, worker_id: &str) -> Vec<WorkerJob> {
        self.bus
            .ensure_subscription(
                &self.config.topics.worker_jobs,
                worker_id,
                Some(PropertyFilter::new(WORKER_ID_PROP, worker_id)),
            )
            .await
            .unwrap();
        let mut jobs = Vec::new();
        loop {
            let delivery = self
                .bus
                .receive(&self.config.topics.worker_jobs, worker_id, StdDuration::ZERO)
                .await
                .unwrap();
            let Some(delivery) = delivery else {
                break;
            };
            let job: WorkerJob = serde_json::from_value(delivery.message.body.clone()).unwrap();
            self.bus
                .settle(&delivery, Disposition::Complete)
                .await
                .unwrap();
            jobs.push(job);
        }
        jobs
    }

    /// Report a successful result for a job and process the fallout.
    pub async fn succeed(&self, job: &WorkerJob, result: Value) {
        self.respond(job, WorkerResultStatus::Success, Some(result), None)
            .await;
    }

    /// Report a failed result for a job and process the fallout.
    pub async fn fail(&self, job: &WorkerJob, message: &str) {
        self.respond(
            job,
            WorkerResultStatus::Failure,
            None,
            Some(WorkerError {
                message: message.to_string(),
                code: None,
            }),
        )
        .await;
    }

    /// Report a poll-shaped result: `{complete, data?}`.
    pub async fn poll_response(&self, job: &WorkerJob, complete: bool, data: Option<Value>) {
        let mut body = json!({"complete": complete});
        if let Some(data) = data {
            body["data"] = data;
        }
        self.respond(job, WorkerResultStatus::Success, Some(body), None)
            .await;
    }

    async fn respond(
        &self,
        job: &WorkerJob,
        status: WorkerResultStatus,
        result: Option<Value>,
        error: Option<WorkerError>,
    ) {
        self.orchestrator
            .handle_worker_result(worker_result(job, status, result, error))
            .await
            .unwrap();
        self.pump().await;
    }

    /// Acquire the scheduler lease under another holder's name.
    pub async fn steal_tick_lease(&self) {
        let ttl = chrono::Duration::seconds(self.config.lock_ttl_secs);
        assert!(self
            .lock
            .acquire("scheduler-tick", "someone-else", ttl, self.clock.now())
            .await
            .unwrap());
    }
}

/// Build a worker result echoing a job's correlation data.
pub(crate) fn worker_result(
    job: &WorkerJob,
    status: WorkerResultStatus,
    result: Option<Value>,
    error: Option<WorkerError>,
) -> WorkerResult {
    WorkerResult {
        job_id: job.job_id.clone(),
        status,
        result,
        error,
        correlation_data: Some(job.correlation_data.clone()),
    }
}

/// A result with hand-rolled correlation data (for corruption tests).
pub(crate) fn result_with_correlation(
    job_id: &str,
    correlation: Option<JobCorrelationData>,
) -> WorkerResult {
    WorkerResult {
        job_id: convoy_core::JobId::new(job_id),
        status: WorkerResultStatus::Success,
        result: None,
        error: None,
        correlation_data: correlation,
    }
}

/// Scheduled two-phase mailbox runbook used across suites.
pub(crate) const TWO_PHASE_RUNBOOK: &str = r#"
name = "mailbox-move"

[data_source]
type = "sql"
connection = "Server=src"
query = "SELECT * FROM moves"
primary_key = "Upn"
batch_time_column = "MoveDate"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "get-mailbox"
worker_id = "mailbox-worker"
function = "get-mailbox"
[phase.step.params]
User = "{{Upn}}"
[phase.step.output_params]
MailboxGuid = "mailboxGuid"

[[phase]]
name = "cutover"
offset = "T-0"

[[phase.step]]
name = "set-guids"
worker_id = "mailbox-worker"
function = "set-guids"
[phase.step.params]
User = "{{Upn}}"
Guid = "{{MailboxGuid}}"
"#;

/// One row for the scheduled runbook's source.
pub(crate) fn move_row(upn: &str, date: &str) -> SourceRow {
    SourceRow::from_pairs(&[("Upn", upn), ("MoveDate", date)])
}
