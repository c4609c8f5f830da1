// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator runtime: consumer pool and message decode/settle discipline

mod dispatch;
mod handlers;
mod publish;

pub(crate) use dispatch::DispatchOutcome;
pub(crate) use publish::publish_event;

use crate::config::EngineConfig;
use crate::error::EngineError;
use convoy_bus::{Bus, Delivery, Disposition};
use convoy_core::{
    Clock, OrchestratorEvent, Runbook, WorkerResult, MESSAGE_TYPE_PROP,
};
use convoy_runbook::{parse_runbook, RunbookDef};
use convoy_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Event-driven half of the engine: consumes orchestrator events and
/// worker results under peek-lock and drives execution state.
pub struct Orchestrator<S, B, C> {
    pub(crate) store: Arc<S>,
    pub(crate) bus: Arc<B>,
    pub(crate) clock: C,
    pub(crate) config: Arc<EngineConfig>,
}

impl<S, B, C> Orchestrator<S, B, C>
where
    S: Store,
    B: Bus,
    C: Clock,
{
    pub fn new(store: Arc<S>, bus: Arc<B>, clock: C, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            bus,
            clock,
            config,
        }
    }

    /// Create the orchestrator's subscriptions (idempotent).
    pub async fn setup(&self) -> Result<(), EngineError> {
        self.bus
            .ensure_subscription(
                &self.config.topics.orchestrator_events,
                &self.config.subscription,
                None,
            )
            .await?;
        self.bus
            .ensure_subscription(
                &self.config.topics.worker_results,
                &self.config.subscription,
                None,
            )
            .await?;
        Ok(())
    }

    /// Run the consumer pool until shutdown, then drain in-flight handlers
    /// up to the grace period; whatever is left is abandoned and the bus
    /// redelivers.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        for _ in 0..self.config.handler_concurrency {
            let orchestrator = Arc::clone(&self);
            let signal = shutdown.clone();
            tasks.spawn(async move { orchestrator.consume_events(signal).await });

            let orchestrator = Arc::clone(&self);
            let signal = shutdown.clone();
            tasks.spawn(async move { orchestrator.consume_results(signal).await });
        }

        // Consumers run until the shutdown flag flips.
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "shutdown grace exceeded, abandoning in-flight handlers"
            );
            tasks.abort_all();
        }
    }

    async fn consume_events(&self, shutdown: watch::Receiver<bool>) {
        let topic = self.config.topics.orchestrator_events.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(delivery) = self.next_delivery(&topic).await else {
                continue;
            };
            let outcome = self.handle_event_message(&delivery).await;
            self.settle_outcome(&topic, &delivery, outcome).await;
        }
    }

    async fn consume_results(&self, shutdown: watch::Receiver<bool>) {
        let topic = self.config.topics.worker_results.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(delivery) = self.next_delivery(&topic).await else {
                continue;
            };
            let outcome = self.handle_result_message(&delivery).await;
            self.settle_outcome(&topic, &delivery, outcome).await;
        }
    }

    async fn next_delivery(&self, topic: &str) -> Option<Delivery> {
        match self
            .bus
            .receive(topic, &self.config.subscription, Duration::from_millis(500))
            .await
        {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::warn!(topic, error = %e, "receive failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                None
            }
        }
    }

    async fn settle_outcome(
        &self,
        topic: &str,
        delivery: &Delivery,
        outcome: Result<(), EngineError>,
    ) {
        let disposition = match outcome {
            Ok(()) => Disposition::Complete,
            Err(e) => {
                let disposition = e.disposition();
                match &disposition {
                    Disposition::DeadLetter { reason } => {
                        tracing::error!(topic, reason = %reason, "dead-lettering message");
                    }
                    _ => {
                        tracing::warn!(topic, error = %e, "handler failed, abandoning");
                    }
                }
                disposition
            }
        };
        if let Err(e) = self.bus.settle(delivery, disposition).await {
            tracing::warn!(topic, error = %e, "settle failed");
        }
    }

    /// Decode and process one orchestrator event.
    pub async fn handle_event_message(&self, delivery: &Delivery) -> Result<(), EngineError> {
        let kind = delivery
            .message
            .property(MESSAGE_TYPE_PROP)
            .ok_or_else(|| EngineError::dead_letter("missing MessageType property"))?;
        let event = OrchestratorEvent::from_parts(kind, &delivery.message.body)?;
        tracing::debug!(event = %event.log_summary(), "processing event");
        self.handle_event(event).await
    }

    /// Process an already-decoded orchestrator event.
    pub async fn handle_event(&self, event: OrchestratorEvent) -> Result<(), EngineError> {
        match event {
            OrchestratorEvent::BatchInit(m) => self.handle_batch_init(m).await,
            OrchestratorEvent::PhaseDue(m) => self.handle_phase_due(m).await,
            OrchestratorEvent::MemberAdded(m) => self.handle_member_added(m).await,
            OrchestratorEvent::MemberRemoved(m) => self.handle_member_removed(m).await,
            OrchestratorEvent::PollCheck(m) => self.handle_poll_check(m).await,
            OrchestratorEvent::RetryCheck(m) => self.handle_retry_check(m).await,
        }
    }

    /// Decode and process one worker result.
    pub async fn handle_result_message(&self, delivery: &Delivery) -> Result<(), EngineError> {
        let result: WorkerResult = serde_json::from_value(delivery.message.body.clone())
            .map_err(|e| EngineError::dead_letter(format!("undecodable worker result: {e}")))?;
        self.handle_worker_result(result).await
    }

    /// Load a runbook version row and its parsed document.
    ///
    /// A message naming a runbook the store does not have, or whose stored
    /// document no longer parses, is corrupt: dead-letter.
    pub(crate) async fn load_runbook(
        &self,
        name: &str,
        version: i32,
    ) -> Result<(Runbook, RunbookDef), EngineError> {
        let runbook = self
            .store
            .get_runbook_by_name(name, Some(version))
            .await?
            .ok_or_else(|| {
                EngineError::dead_letter(format!("unknown runbook {name} v{version}"))
            })?;
        let def = parse_runbook(&runbook.document).map_err(|e| {
            EngineError::dead_letter(format!("stored runbook {name} v{version} invalid: {e}"))
        })?;
        Ok((runbook, def))
    }

    /// Publish an event to the orchestrator-events topic.
    pub(crate) async fn publish_event(
        &self,
        event: &OrchestratorEvent,
        enqueue_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), EngineError> {
        publish_event(
            self.bus.as_ref(),
            &self.config.topics.orchestrator_events,
            event,
            enqueue_at,
        )
        .await
    }
}

#[cfg(test)]
#[path = "../runtime_tests/mod.rs"]
mod tests;
