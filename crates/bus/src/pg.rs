// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres-backed bus
//!
//! Fans out on publish (one row per matching subscription), receives under
//! peek-lock via `FOR UPDATE SKIP LOCKED`, and parks poison messages with a
//! dead-letter reason. Requires the `bus_*` tables from the storage
//! migrations.

use crate::message::{Delivery, Disposition, InboundMessage, OutboundMessage, PropertyFilter};
use crate::{Bus, BusError};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;

/// How long a peek-lock holds before the message becomes deliverable again.
const LOCK_DURATION_SECS: i64 = 60;

/// Deliveries beyond this count dead-letter automatically.
const MAX_DELIVERY_COUNT: i32 = 10;

/// How often an idle receive re-polls the table.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

impl From<sqlx::Error> for BusError {
    fn from(e: sqlx::Error) -> Self {
        BusError::Backend(e.to_string())
    }
}

/// [`Bus`] implementation over a Postgres pool.
#[derive(Clone)]
pub struct PgBus {
    pool: PgPool,
    dedup_window: ChronoDuration,
}

impl PgBus {
    pub fn new(pool: PgPool) -> Self {
        Self::with_dedup_window(pool, ChronoDuration::minutes(10))
    }

    pub fn with_dedup_window(pool: PgPool, dedup_window: ChronoDuration) -> Self {
        Self { pool, dedup_window }
    }

    /// Record the message id for duplicate detection.
    ///
    /// Returns false when the id was already seen inside the window.
    async fn dedup_admit(&self, topic: &str, message_id: &str) -> Result<bool, BusError> {
        let horizon = Utc::now() - self.dedup_window;
        sqlx::query("DELETE FROM bus_dedup WHERE topic = $1 AND seen_at < $2")
            .bind(topic)
            .bind(horizon)
            .execute(&self.pool)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO bus_dedup (topic, message_id, seen_at) VALUES ($1, $2, $3) \
             ON CONFLICT (topic, message_id) DO NOTHING",
        )
        .bind(topic)
        .bind(message_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn try_receive(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<Option<Delivery>, BusError> {
        loop {
            let lock_token = uuid::Uuid::new_v4().to_string();
            let row = sqlx::query(
                "WITH next AS ( \
                   SELECT id FROM bus_messages \
                   WHERE topic = $1 AND subscription = $2 \
                     AND NOT dead_lettered \
                     AND visible_at <= NOW() \
                     AND (locked_until IS NULL OR locked_until <= NOW()) \
                   ORDER BY id \
                   LIMIT 1 \
                   FOR UPDATE SKIP LOCKED \
                 ) \
                 UPDATE bus_messages m \
                 SET locked_until = NOW() + make_interval(secs => $3), \
                     lock_token = $4, \
                     delivery_count = m.delivery_count + 1 \
                 FROM next WHERE m.id = next.id \
                 RETURNING m.body, m.content_type, m.properties, m.message_id, \
                           m.delivery_count",
            )
            .bind(topic)
            .bind(subscription)
            .bind(LOCK_DURATION_SECS as f64)
            .bind(&lock_token)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            let delivery_count: i32 = row.try_get("delivery_count")?;
            if delivery_count > MAX_DELIVERY_COUNT {
                sqlx::query(
                    "UPDATE bus_messages \
                     SET dead_lettered = TRUE, dead_letter_reason = $2, \
                         locked_until = NULL, lock_token = NULL \
                     WHERE lock_token = $1",
                )
                .bind(&lock_token)
                .bind("MaxDeliveryCountExceeded")
                .execute(&self.pool)
                .await?;
                continue;
            }

            let properties: serde_json::Value = row.try_get("properties")?;
            let properties: HashMap<String, String> = serde_json::from_value(properties)?;

            return Ok(Some(Delivery {
                message: InboundMessage {
                    body: row.try_get("body")?,
                    content_type: row.try_get("content_type")?,
                    properties,
                    message_id: row.try_get("message_id")?,
                    delivery_count: delivery_count as u32,
                },
                topic: topic.to_string(),
                subscription: subscription.to_string(),
                lock_token,
            }));
        }
    }
}

#[async_trait]
impl Bus for PgBus {
    async fn ensure_subscription(
        &self,
        topic: &str,
        subscription: &str,
        filter: Option<PropertyFilter>,
    ) -> Result<(), BusError> {
        sqlx::query(
            "INSERT INTO bus_subscriptions (topic, name, filter_property, filter_value) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (topic, name) DO NOTHING",
        )
        .bind(topic)
        .bind(subscription)
        .bind(filter.as_ref().map(|f| f.property.clone()))
        .bind(filter.as_ref().map(|f| f.equals.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), BusError> {
        if let Some(id) = &message.message_id {
            if !self.dedup_admit(topic, id).await? {
                tracing::debug!(topic, message_id = %id, "duplicate suppressed");
                return Ok(());
            }
        }

        let subscriptions = sqlx::query(
            "SELECT name, filter_property, filter_value FROM bus_subscriptions WHERE topic = $1",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let properties = serde_json::to_value(&message.properties)?;
        let visible_at = message.enqueue_at.unwrap_or_else(Utc::now);

        for sub in subscriptions {
            let name: String = sub.try_get("name")?;
            let filter_property: Option<String> = sub.try_get("filter_property")?;
            let filter_value: Option<String> = sub.try_get("filter_value")?;
            if let (Some(property), Some(value)) = (filter_property, filter_value) {
                if !PropertyFilter::new(property, value).matches(&message.properties) {
                    continue;
                }
            }

            sqlx::query(
                "INSERT INTO bus_messages \
                   (topic, subscription, body, content_type, properties, message_id, visible_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(topic)
            .bind(&name)
            .bind(&message.body)
            .bind(&message.content_type)
            .bind(&properties)
            .bind(&message_id)
            .bind(visible_at)
            .execute(&self.pool)
            .await?;
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
            if let Some(delivery) = self.try_receive(topic, subscription).await? {
                return Ok(Some(delivery));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<(), BusError> {
        let affected = match disposition {
            Disposition::Complete => {
                sqlx::query("DELETE FROM bus_messages WHERE lock_token = $1")
                    .bind(&delivery.lock_token)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            Disposition::Abandon => {
                sqlx::query(
                    "UPDATE bus_messages SET locked_until = NULL, lock_token = NULL \
                     WHERE lock_token = $1",
                )
                .bind(&delivery.lock_token)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            Disposition::DeadLetter { reason } => {
                sqlx::query(
                    "UPDATE bus_messages \
                     SET dead_lettered = TRUE, dead_letter_reason = $2, \
                         locked_until = NULL, lock_token = NULL \
                     WHERE lock_token = $1",
                )
                .bind(&delivery.lock_token)
                .bind(reason)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            return Err(BusError::UnknownLock(delivery.lock_token.clone()));
        }
        Ok(())
    }
}
