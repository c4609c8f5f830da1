// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable topic-and-subscription message bus abstraction
//!
//! The engine talks to the bus through the [`Bus`] trait: typed JSON
//! publish with string application properties, scheduled enqueue,
//! peek-lock receive with explicit complete/abandon/dead-letter, and
//! subscription filtering on property equality. Deterministic message ids
//! plus the duplicate-detection window give best-effort at-most-one
//! dispatch for worker jobs.

mod memory;
mod message;
mod pg;

pub use memory::MemoryBus;
pub use message::{
    Delivery, Disposition, InboundMessage, OutboundMessage, PropertyFilter,
};
pub use pg::PgBus;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from the bus backend.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("subscription not found: {topic}/{subscription}")]
    SubscriptionNotFound { topic: String, subscription: String },

    #[error("unknown or expired lock token: {0}")]
    UnknownLock(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("bus backend error: {0}")]
    Backend(String),
}

impl BusError {
    /// Whether the engine should abandon the in-flight message and let the
    /// bus redeliver, rather than treating this as corruption.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Backend(_) | BusError::UnknownLock(_))
    }
}

/// A durable topic-and-subscription bus.
///
/// Subscriptions must be created before messages can fan out to them;
/// publishing to a topic with no subscriptions drops the message.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Idempotently create a subscription, optionally filtered on
    /// application-property equality (used to route jobs by `WorkerId`).
    async fn ensure_subscription(
        &self,
        topic: &str,
        subscription: &str,
        filter: Option<PropertyFilter>,
    ) -> Result<(), BusError>;

    /// Publish a message to a topic.
    ///
    /// A message with a `message_id` already seen within the
    /// duplicate-detection window is silently dropped.
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), BusError>;

    /// Receive the next available message under peek-lock, waiting up to
    /// `wait` for one to become available.
    async fn receive(
        &self,
        topic: &str,
        subscription: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BusError>;

    /// Settle a peek-locked delivery.
    async fn settle(&self, delivery: &Delivery, disposition: Disposition)
        -> Result<(), BusError>;
}
