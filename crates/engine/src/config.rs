// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration
//!
//! Loaded once at startup and passed explicitly; nothing here changes at
//! runtime.

use std::time::Duration;

/// Logical topic names.
#[derive(Debug, Clone)]
pub struct Topics {
    pub orchestrator_events: String,
    pub worker_jobs: String,
    pub worker_results: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            orchestrator_events: "orchestrator-events".to_string(),
            worker_jobs: "worker-jobs".to_string(),
            worker_results: "worker-results".to_string(),
        }
    }
}

/// Process-wide engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub topics: Topics,
    /// Subscription name the orchestrator consumes under, on both the
    /// events and results topics.
    pub subscription: String,
    /// Scheduler tick interval.
    pub tick_interval: Duration,
    /// Hard deadline for one data-source query.
    pub query_timeout: Duration,
    /// Concurrent handler tasks per subscription.
    pub handler_concurrency: usize,
    /// Drain budget for in-flight handlers at shutdown.
    pub shutdown_grace: Duration,
    /// TTL of the scheduler-tick lease; must exceed the longest tick.
    pub lock_ttl_secs: i64,
    /// Extra margin added when a poll-check re-schedules itself, so the
    /// worker-driven reschedule normally wins.
    pub poll_safety_secs: i64,
    /// Bucket width for immediate batching.
    pub immediate_bucket_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topics: Topics::default(),
            subscription: "orchestrator".to_string(),
            tick_interval: Duration::from_secs(300),
            query_timeout: Duration::from_secs(90),
            handler_concurrency: 16,
            shutdown_grace: Duration::from_secs(30),
            lock_ttl_secs: 300,
            poll_safety_secs: 30,
            immediate_bucket_minutes: 5,
        }
    }
}
