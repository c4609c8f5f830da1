// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event publication shared by the scheduler and the orchestrator

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use convoy_bus::{Bus, OutboundMessage};
use convoy_core::{OrchestratorEvent, MESSAGE_TYPE_PROP};

/// Publish an orchestrator event, optionally as a scheduled enqueue.
pub(crate) async fn publish_event<B: Bus>(
    bus: &B,
    topic: &str,
    event: &OrchestratorEvent,
    enqueue_at: Option<DateTime<Utc>>,
) -> Result<(), EngineError> {
    let mut message =
        OutboundMessage::json(event.to_body()?).with_property(MESSAGE_TYPE_PROP, event.kind());
    if let Some(at) = enqueue_at {
        message = message.scheduled_at(at);
    }
    bus.publish(topic, message).await?;
    Ok(())
}
