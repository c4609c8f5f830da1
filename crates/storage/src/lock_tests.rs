// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn acquire_is_exclusive_until_expiry() {
    let lock = MemLeaseLock::new();
    let ttl = Duration::minutes(5);

    assert!(lock.acquire("scheduler-tick", "a", ttl, now()).await.unwrap());
    assert!(!lock.acquire("scheduler-tick", "b", ttl, now()).await.unwrap());

    // Expired lease is free for the taking.
    let later = now() + Duration::minutes(6);
    assert!(lock.acquire("scheduler-tick", "b", ttl, later).await.unwrap());
}

#[tokio::test]
async fn holder_can_reacquire_and_renew() {
    let lock = MemLeaseLock::new();
    let ttl = Duration::minutes(5);

    assert!(lock.acquire("scheduler-tick", "a", ttl, now()).await.unwrap());
    assert!(lock.acquire("scheduler-tick", "a", ttl, now()).await.unwrap());
    assert!(lock
        .renew("scheduler-tick", "a", ttl, now() + Duration::minutes(4))
        .await
        .unwrap());
    // The renewal pushed expiry past the original TTL.
    assert!(!lock
        .acquire("scheduler-tick", "b", ttl, now() + Duration::minutes(6))
        .await
        .unwrap());
}

#[tokio::test]
async fn renew_after_loss_fails() {
    let lock = MemLeaseLock::new();
    let ttl = Duration::minutes(5);

    assert!(lock.acquire("scheduler-tick", "a", ttl, now()).await.unwrap());
    let later = now() + Duration::minutes(6);
    assert!(lock.acquire("scheduler-tick", "b", ttl, later).await.unwrap());
    assert!(!lock.renew("scheduler-tick", "a", ttl, later).await.unwrap());
}

#[tokio::test]
async fn release_only_frees_own_lease() {
    let lock = MemLeaseLock::new();
    let ttl = Duration::minutes(5);

    assert!(lock.acquire("scheduler-tick", "a", ttl, now()).await.unwrap());
    lock.release("scheduler-tick", "b").await.unwrap();
    assert!(!lock.acquire("scheduler-tick", "b", ttl, now()).await.unwrap());

    lock.release("scheduler-tick", "a").await.unwrap();
    assert!(lock.acquire("scheduler-tick", "b", ttl, now()).await.unwrap());
}
