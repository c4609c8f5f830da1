// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use convoy_core::FakeClock;
use serde_json::json;
use std::time::Duration as StdDuration;

const TOPIC: &str = "orchestrator-events";
const SUB: &str = "engine";

async fn bus_with_sub() -> (MemoryBus<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let bus = MemoryBus::new(clock.clone());
    bus.ensure_subscription(TOPIC, SUB, None).await.unwrap();
    (bus, clock)
}

fn recv(
    bus: &MemoryBus<FakeClock>,
) -> impl std::future::Future<Output = Result<Option<Delivery>, BusError>> + '_ {
    bus.receive(TOPIC, SUB, StdDuration::ZERO)
}

#[tokio::test]
async fn publish_receive_complete() {
    let (bus, _clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({"n": 1})))
        .await
        .unwrap();

    let delivery = recv(&bus).await.unwrap().unwrap();
    assert_eq!(delivery.message.body, json!({"n": 1}));
    assert_eq!(delivery.message.delivery_count, 1);

    bus.settle(&delivery, Disposition::Complete).await.unwrap();
    assert!(recv(&bus).await.unwrap().is_none());
}

#[tokio::test]
async fn peek_lock_hides_message_until_abandoned() {
    let (bus, _clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({})))
        .await
        .unwrap();

    let delivery = recv(&bus).await.unwrap().unwrap();
    // Locked: a second receive sees nothing.
    assert!(recv(&bus).await.unwrap().is_none());

    bus.settle(&delivery, Disposition::Abandon).await.unwrap();
    let redelivered = recv(&bus).await.unwrap().unwrap();
    assert_eq!(redelivered.message.delivery_count, 2);
}

#[tokio::test]
async fn expired_lock_redelivers() {
    let (bus, clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({})))
        .await
        .unwrap();

    let _delivery = recv(&bus).await.unwrap().unwrap();
    clock.advance(chrono::Duration::seconds(LOCK_DURATION_SECS + 1));
    assert!(recv(&bus).await.unwrap().is_some());
}

#[tokio::test]
async fn double_settle_is_an_unknown_lock() {
    let (bus, _clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({})))
        .await
        .unwrap();
    let delivery = recv(&bus).await.unwrap().unwrap();
    bus.settle(&delivery, Disposition::Complete).await.unwrap();
    let err = bus.settle(&delivery, Disposition::Complete).await.unwrap_err();
    assert!(matches!(err, BusError::UnknownLock(_)));
}

#[tokio::test]
async fn dead_letter_parks_message_with_reason() {
    let (bus, _clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({"bad": true})))
        .await
        .unwrap();
    let delivery = recv(&bus).await.unwrap().unwrap();
    bus.settle(&delivery, Disposition::dead_letter("MissingCorrelationData"))
        .await
        .unwrap();

    assert!(recv(&bus).await.unwrap().is_none());
    let dead = bus.dead_letters(TOPIC, SUB);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1, "MissingCorrelationData");
}

#[tokio::test]
async fn scheduled_enqueue_stays_invisible_until_due() {
    let (bus, clock) = bus_with_sub().await;
    let due = clock.now() + chrono::Duration::minutes(5);
    bus.publish(
        TOPIC,
        OutboundMessage::json(json!({"check": 1})).scheduled_at(due),
    )
    .await
    .unwrap();

    assert!(recv(&bus).await.unwrap().is_none());
    clock.advance(chrono::Duration::minutes(4));
    assert!(recv(&bus).await.unwrap().is_none());
    clock.advance(chrono::Duration::minutes(1));
    assert!(recv(&bus).await.unwrap().is_some());
}

#[tokio::test]
async fn duplicate_message_ids_are_suppressed_within_window() {
    let (bus, clock) = bus_with_sub().await;
    let msg = || OutboundMessage::json(json!({})).with_message_id("step-1");

    bus.publish(TOPIC, msg()).await.unwrap();
    bus.publish(TOPIC, msg()).await.unwrap();
    assert_eq!(bus.backlog(TOPIC, SUB), 1);

    // Outside the window the same id is admitted again.
    clock.advance(chrono::Duration::minutes(11));
    bus.publish(TOPIC, msg()).await.unwrap();
    assert_eq!(bus.backlog(TOPIC, SUB), 2);
}

#[tokio::test]
async fn property_filter_routes_to_matching_subscription_only() {
    let clock = FakeClock::new();
    let bus = MemoryBus::new(clock.clone());
    bus.ensure_subscription(
        "worker-jobs",
        "mailbox-worker",
        Some(PropertyFilter::new("WorkerId", "mailbox-worker")),
    )
    .await
    .unwrap();
    bus.ensure_subscription(
        "worker-jobs",
        "drive-worker",
        Some(PropertyFilter::new("WorkerId", "drive-worker")),
    )
    .await
    .unwrap();

    bus.publish(
        "worker-jobs",
        OutboundMessage::json(json!({"job": 1})).with_property("WorkerId", "mailbox-worker"),
    )
    .await
    .unwrap();

    let hit = bus
        .receive("worker-jobs", "mailbox-worker", StdDuration::ZERO)
        .await
        .unwrap();
    assert!(hit.is_some());
    let miss = bus
        .receive("worker-jobs", "drive-worker", StdDuration::ZERO)
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn receive_from_unknown_subscription_errors() {
    let clock = FakeClock::new();
    let bus = MemoryBus::new(clock);
    let err = bus
        .receive("nope", "nope", StdDuration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::SubscriptionNotFound { .. }));
}

#[tokio::test]
async fn poison_message_dead_letters_after_max_deliveries() {
    let (bus, _clock) = bus_with_sub().await;
    bus.publish(TOPIC, OutboundMessage::json(json!({})))
        .await
        .unwrap();

    for _ in 0..MAX_DELIVERY_COUNT {
        let delivery = recv(&bus).await.unwrap().unwrap();
        bus.settle(&delivery, Disposition::Abandon).await.unwrap();
    }
    assert!(recv(&bus).await.unwrap().is_none());
    let dead = bus.dead_letters(TOPIC, SUB);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1, "MaxDeliveryCountExceeded");
}
