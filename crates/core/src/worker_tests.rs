// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    mailbox      = { "mailbox-worker", WorkerPool::Mailbox },
    drive        = { "drive-worker", WorkerPool::Drive },
    identity     = { "identity-worker", WorkerPool::Identity },
    notification = { "notification-worker", WorkerPool::Notification },
)]
fn known_pools_resolve(id: &str, pool: WorkerPool) {
    assert_eq!(WorkerRoute::resolve(id), WorkerRoute::Pool(pool));
    assert_eq!(WorkerRoute::resolve(id).worker_id(), id);
}

#[test]
fn unknown_worker_routes_by_raw_id() {
    let route = WorkerRoute::resolve("tenant-acme-worker");
    assert_eq!(route, WorkerRoute::Custom(WorkerId::new("tenant-acme-worker")));
    assert_eq!(route.worker_id(), "tenant-acme-worker");
}

#[test]
fn pool_ids_round_trip() {
    for pool in [
        WorkerPool::Mailbox,
        WorkerPool::Drive,
        WorkerPool::Identity,
        WorkerPool::Notification,
    ] {
        assert_eq!(WorkerPool::from_id(pool.id()), Some(pool));
    }
}
