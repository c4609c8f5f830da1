// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message envelopes

use chrono::{DateTime, Utc};
use convoy_core::CONTENT_TYPE_JSON;
use std::collections::HashMap;

/// A message to publish: JSON body plus string application properties.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub body: serde_json::Value,
    pub content_type: String,
    pub properties: HashMap<String, String>,
    /// Deterministic id enabling duplicate detection; `None` opts out.
    pub message_id: Option<String>,
    /// Scheduled-enqueue time; the message stays invisible until then.
    pub enqueue_at: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    /// A JSON message with no properties.
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            body,
            content_type: CONTENT_TYPE_JSON.to_string(),
            properties: HashMap::new(),
            message_id: None,
            enqueue_at: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.enqueue_at = Some(at);
        self
    }
}

/// A received message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub body: serde_json::Value,
    pub content_type: String,
    pub properties: HashMap<String, String>,
    pub message_id: String,
    /// How many times this message has been delivered, this one included.
    pub delivery_count: u32,
}

impl InboundMessage {
    /// Application property lookup.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }
}

/// A peek-locked delivery; settle it exactly once via [`crate::Bus::settle`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: InboundMessage,
    pub topic: String,
    pub subscription: String,
    pub(crate) lock_token: String,
}

impl Delivery {
    pub fn lock_token(&self) -> &str {
        &self.lock_token
    }
}

/// How to settle a peek-locked delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processing succeeded; remove the message.
    Complete,
    /// Transient failure; release the lock for redelivery.
    Abandon,
    /// Unrecoverable message; park it with a reason.
    DeadLetter { reason: String },
}

impl Disposition {
    pub fn dead_letter(reason: impl Into<String>) -> Self {
        Disposition::DeadLetter {
            reason: reason.into(),
        }
    }
}

/// Subscription filter: deliver only messages whose property equals the
/// given value (the SQL-filter `WorkerId = '<id>'` equivalent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFilter {
    pub property: String,
    pub equals: String,
}

impl PropertyFilter {
    pub fn new(property: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, properties: &HashMap<String, String>) -> bool {
        properties.get(&self.property) == Some(&self.equals)
    }
}
