// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scenario harness
//!
//! Builds the whole engine over in-memory backends and plays both sides
//! of the bus: the scheduler/orchestrator on one end and a scripted
//! "worker" on the other.

use chrono::{DateTime, TimeZone, Utc};
use convoy_adapters::{FakeSource, SourceRow};
use convoy_bus::{Bus, Disposition, MemoryBus, OutboundMessage, PropertyFilter};
use convoy_core::{
    FakeClock, OverdueBehavior, Runbook, WorkerError, WorkerJob, WorkerResult,
    WorkerResultStatus, MESSAGE_TYPE_PROP, WORKER_ID_PROP,
};
use convoy_engine::{Admin, EngineConfig, Orchestrator, Scheduler};
use convoy_runbook::Format;
use convoy_storage::{MemLeaseLock, MemStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;

pub type TestBus = MemoryBus<FakeClock>;
pub type TestOrchestrator = Orchestrator<MemStore, TestBus, FakeClock>;
pub type TestScheduler = Scheduler<MemStore, TestBus, FakeSource, MemLeaseLock, FakeClock>;

pub struct World {
    pub store: Arc<MemStore>,
    pub bus: Arc<TestBus>,
    pub clock: FakeClock,
    pub source: Arc<FakeSource>,
    pub config: Arc<EngineConfig>,
    pub orchestrator: Arc<TestOrchestrator>,
    pub scheduler: Arc<TestScheduler>,
    pub admin: Admin<MemStore, TestBus, FakeClock>,
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

impl World {
    pub async fn new() -> Self {
        let clock = FakeClock::at(at(2030, 1, 1, 0, 0));
        let store = Arc::new(MemStore::new());
        let bus = Arc::new(MemoryBus::new(clock.clone()));
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
            config,
            orchestrator,
            scheduler,
            admin,
        }
    }

    pub async fn publish_runbook(&self, document: &str) -> Runbook {
        let runbook = self
            .admin
            .publish_runbook(document, Format::Toml, OverdueBehavior::Rerun, false)
            .await
            .unwrap();
        self.admin
            .set_automation(&runbook.name, true, "specs")
            .await
            .unwrap();
        runbook
    }

    /// One scheduler tick plus full event processing.
    pub async fn tick(&self) {
        self.scheduler.tick().await.unwrap();
        self.drain().await;
    }

    /// Process orchestrator events and worker results until both
    /// subscriptions run dry.
    pub async fn drain(&self) {
        loop {
            let mut progressed = false;

            let events_topic = &self.config.topics.orchestrator_events;
            while let Some(delivery) = self
                .bus
                .receive(events_topic, &self.config.subscription, StdDuration::ZERO)
                .await
                .unwrap()
            {
                let outcome = self.orchestrator.handle_event_message(&delivery).await;
                let disposition = match outcome {
                    Ok(()) => Disposition::Complete,
                    Err(e) => e.disposition(),
                };
                self.bus.settle(&delivery, disposition).await.unwrap();
                progressed = true;
            }

            let results_topic = &self.config.topics.worker_results;
            while let Some(delivery) = self
                .bus
                .receive(results_topic, &self.config.subscription, StdDuration::ZERO)
                .await
                .unwrap()
            {
                let outcome = self.orchestrator.handle_result_message(&delivery).await;
                let disposition = match outcome {
                    Ok(()) => Disposition::Complete,
                    Err(e) => e.disposition(),
                };
                self.bus.settle(&delivery, disposition).await.unwrap();
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    /// Drain every job waiting for the given worker (acting as that
    /// worker's consumer).
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
        while let Some(delivery) = self
            .bus
            .receive(&self.config.topics.worker_jobs, worker_id, StdDuration::ZERO)
            .await
            .unwrap()
        {
            jobs.push(serde_json::from_value(delivery.message.body.clone()).unwrap());
            self.bus
                .settle(&delivery, Disposition::Complete)
                .await
                .unwrap();
        }
        jobs
    }

    /// Publish a worker result onto the results topic and process it.
    pub async fn publish_result(&self, result: &WorkerResult) {
        let message = OutboundMessage::json(serde_json::to_value(result).unwrap())
            .with_property(MESSAGE_TYPE_PROP, "worker-result");
        self.bus
            .publish(&self.config.topics.worker_results, message)
            .await
            .unwrap();
        self.drain().await;
    }

    pub async fn succeed(&self, job: &WorkerJob, result: Value) {
        self.publish_result(&WorkerResult {
            job_id: job.job_id.clone(),
            status: WorkerResultStatus::Success,
            result: Some(result),
            error: None,
            correlation_data: Some(job.correlation_data.clone()),
        })
        .await;
    }

    pub async fn fail(&self, job: &WorkerJob, message: &str) {
        self.publish_result(&WorkerResult {
            job_id: job.job_id.clone(),
            status: WorkerResultStatus::Failure,
            result: None,
            error: Some(WorkerError {
                message: message.to_string(),
                code: None,
            }),
            correlation_data: Some(job.correlation_data.clone()),
        })
        .await;
    }

    pub async fn poll_response(&self, job: &WorkerJob, complete: bool, data: Option<Value>) {
        let mut body = json!({"complete": complete});
        if let Some(data) = data {
            body["data"] = data;
        }
        self.publish_result(&WorkerResult {
            job_id: job.job_id.clone(),
            status: WorkerResultStatus::Success,
            result: Some(body),
            error: None,
            correlation_data: Some(job.correlation_data.clone()),
        })
        .await;
    }
}

pub fn row(pairs: &[(&str, &str)]) -> SourceRow {
    SourceRow::from_pairs(pairs)
}
