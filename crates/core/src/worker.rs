// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and routing
//!
//! The engine never interprets function names; it resolves a runbook's
//! `worker_id` to a routing target and forwards the call over the bus.
//! Well-known worker pools get enum variants; anything else routes by raw
//! id.

crate::define_id! {
    /// Identifier of a worker pool, used as the `WorkerId` application
    /// property and as the worker-jobs subscription name.
    pub struct WorkerId;
}

/// Well-known worker pools shipped with the standard deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPool {
    /// Mailbox content and settings migrations.
    Mailbox,
    /// Drive/file payload migrations.
    Drive,
    /// Directory/identity operations.
    Identity,
    /// Outbound notifications (mail, chat posts).
    Notification,
}

impl WorkerPool {
    pub fn id(&self) -> &'static str {
        match self {
            WorkerPool::Mailbox => "mailbox-worker",
            WorkerPool::Drive => "drive-worker",
            WorkerPool::Identity => "identity-worker",
            WorkerPool::Notification => "notification-worker",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "mailbox-worker" => Some(WorkerPool::Mailbox),
            "drive-worker" => Some(WorkerPool::Drive),
            "identity-worker" => Some(WorkerPool::Identity),
            "notification-worker" => Some(WorkerPool::Notification),
            _ => None,
        }
    }
}

/// Routing target for one step: a known pool or a custom worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRoute {
    Pool(WorkerPool),
    Custom(WorkerId),
}

impl WorkerRoute {
    /// Resolve a runbook `worker_id` to a route, falling back to the raw
    /// id for workers the engine does not know about.
    pub fn resolve(worker_id: &str) -> Self {
        match WorkerPool::from_id(worker_id) {
            Some(pool) => WorkerRoute::Pool(pool),
            None => WorkerRoute::Custom(WorkerId::new(worker_id)),
        }
    }

    /// The `WorkerId` property value for this route.
    pub fn worker_id(&self) -> WorkerId {
        match self {
            WorkerRoute::Pool(pool) => WorkerId::new(pool.id()),
            WorkerRoute::Custom(id) => id.clone(),
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
