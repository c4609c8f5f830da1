// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory bus with full peek-lock semantics
//!
//! Backs the engine's test suites and single-process development runs.
//! Scheduled delivery, lock expiry, and the duplicate-detection window are
//! all driven by the injected [`Clock`], so tests advance time explicitly.

use crate::message::{Delivery, Disposition, InboundMessage, OutboundMessage, PropertyFilter};
use crate::{Bus, BusError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use convoy_core::Clock;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// How long a peek-lock holds before the message becomes deliverable again.
const LOCK_DURATION_SECS: i64 = 60;

/// Deliveries beyond this count dead-letter automatically.
const MAX_DELIVERY_COUNT: u32 = 10;

#[derive(Debug)]
struct QueuedMessage {
    message: InboundMessage,
    visible_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct LockedMessage {
    message: InboundMessage,
    locked_until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Subscription {
    filter: Option<PropertyFilter>,
    queue: VecDeque<QueuedMessage>,
    locked: HashMap<String, LockedMessage>,
    dead: Vec<(InboundMessage, String)>,
}

#[derive(Debug, Default)]
struct Topic {
    subscriptions: HashMap<String, Subscription>,
    /// message_id → first seen, for duplicate detection.
    dedup: HashMap<String, DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Topic>,
}

/// In-memory [`Bus`] implementation.
#[derive(Clone)]
pub struct MemoryBus<C: Clock> {
    state: Arc<Mutex<State>>,
    clock: C,
    dedup_window: ChronoDuration,
}

impl<C: Clock> MemoryBus<C> {
    pub fn new(clock: C) -> Self {
        Self::with_dedup_window(clock, ChronoDuration::minutes(10))
    }

    pub fn with_dedup_window(clock: C, dedup_window: ChronoDuration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            dedup_window,
        }
    }

    /// Dead-lettered messages of a subscription, with reasons (test hook).
    pub fn dead_letters(&self, topic: &str, subscription: &str) -> Vec<(InboundMessage, String)> {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| t.subscriptions.get(subscription))
            .map(|s| s.dead.clone())
            .unwrap_or_default()
    }

    /// Count of messages currently queued or scheduled (test hook).
    pub fn backlog(&self, topic: &str, subscription: &str) -> usize {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| t.subscriptions.get(subscription))
            .map(|s| s.queue.len())
            .unwrap_or_default()
    }

    fn try_receive(&self, topic: &str, subscription: &str) -> Result<Option<Delivery>, BusError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let sub = state
            .topics
            .get_mut(topic)
            .and_then(|t| t.subscriptions.get_mut(subscription))
            .ok_or_else(|| BusError::SubscriptionNotFound {
                topic: topic.to_string(),
                subscription: subscription.to_string(),
            })?;

        // Expired locks go back to the front of the queue.
        let expired: Vec<String> = sub
            .locked
            .iter()
            .filter(|(_, l)| l.locked_until <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in expired {
            if let Some(lock) = sub.locked.remove(&token) {
                sub.queue.push_front(QueuedMessage {
                    message: lock.message,
                    visible_at: None,
                });
            }
        }

        // Deliver the first visible message, dead-lettering any that have
        // exhausted their delivery budget along the way.
        loop {
            let idx = sub
                .queue
                .iter()
                .position(|q| q.visible_at.map(|at| at <= now).unwrap_or(true));
            let Some(idx) = idx else {
                return Ok(None);
            };
            let Some(mut queued) = sub.queue.remove(idx) else {
                return Ok(None);
            };

            queued.message.delivery_count += 1;
            if queued.message.delivery_count > MAX_DELIVERY_COUNT {
                sub.dead
                    .push((queued.message, "MaxDeliveryCountExceeded".to_string()));
                continue;
            }

            let lock_token = uuid::Uuid::new_v4().to_string();
            let delivery = Delivery {
                message: queued.message.clone(),
                topic: topic.to_string(),
                subscription: subscription.to_string(),
                lock_token: lock_token.clone(),
            };
            sub.locked.insert(
                lock_token,
                LockedMessage {
                    message: queued.message,
                    locked_until: now + ChronoDuration::seconds(LOCK_DURATION_SECS),
                },
            );
            return Ok(Some(delivery));
        }
    }
}

#[async_trait]
impl<C: Clock> Bus for MemoryBus<C> {
    async fn ensure_subscription(
        &self,
        topic: &str,
        subscription: &str,
        filter: Option<PropertyFilter>,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let topic = state.topics.entry(topic.to_string()).or_default();
        topic
            .subscriptions
            .entry(subscription.to_string())
            .or_insert_with(|| Subscription {
                filter,
                ..Subscription::default()
            });
        Ok(())
    }

    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), BusError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let topic_state = state.topics.entry(topic.to_string()).or_default();

        // Duplicate detection on deterministic message ids.
        if let Some(id) = &message.message_id {
            let window = self.dedup_window;
            topic_state.dedup.retain(|_, seen| *seen + window > now);
            if topic_state.dedup.contains_key(id) {
                tracing::debug!(topic, message_id = %id, "duplicate suppressed");
                return Ok(());
            }
            topic_state.dedup.insert(id.clone(), now);
        }

        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        for sub in topic_state.subscriptions.values_mut() {
            let matches = sub
                .filter
                .as_ref()
                .map(|f| f.matches(&message.properties))
                .unwrap_or(true);
            if !matches {
                continue;
            }
            sub.queue.push_back(QueuedMessage {
                message: InboundMessage {
                    body: message.body.clone(),
                    content_type: message.content_type.clone(),
                    properties: message.properties.clone(),
                    message_id: message_id.clone(),
                    delivery_count: 0,
                },
                visible_at: message.enqueue_at.filter(|at| *at > now),
            });
        }
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        subscription: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BusError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_receive(topic, subscription)? {
                return Ok(Some(delivery));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let sub = state
            .topics
            .get_mut(&delivery.topic)
            .and_then(|t| t.subscriptions.get_mut(&delivery.subscription))
            .ok_or_else(|| BusError::SubscriptionNotFound {
                topic: delivery.topic.clone(),
                subscription: delivery.subscription.clone(),
            })?;

        let lock = sub
            .locked
            .remove(&delivery.lock_token)
            .ok_or_else(|| BusError::UnknownLock(delivery.lock_token.clone()))?;

        match disposition {
            Disposition::Complete => {}
            Disposition::Abandon => {
                sub.queue.push_front(QueuedMessage {
                    message: lock.message,
                    visible_at: None,
                });
            }
            Disposition::DeadLetter { reason } => {
                sub.dead.push((lock.message, reason));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
