// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic job identifiers
//!
//! Every outbound worker job id is derived from the execution row id and
//! its retry/poll state, so redelivery or handler crashes re-derive the
//! same id and the jobs topic's duplicate-detection window suppresses
//! double dispatch.

use crate::execution::{InitExecutionId, StepExecutionId};

crate::define_id! {
    /// Deterministic id of one outbound worker job.
    ///
    /// Forms: `init-{id}`, `init-{id}-retry-{n}`, `step-{id}`,
    /// `step-{id}-retry-{n}`, `step-{id}-poll-{n}`.
    pub struct JobId;
}

impl JobId {
    /// Job id for a step dispatch at the given retry count (0 = first
    /// attempt).
    pub fn step(id: StepExecutionId, retry_count: i32) -> Self {
        if retry_count == 0 {
            Self::new(format!("step-{}", id))
        } else {
            Self::new(format!("step-{}-retry-{}", id, retry_count))
        }
    }

    /// Job id for a poll call against an in-progress step.
    pub fn step_poll(id: StepExecutionId, poll_count: i32) -> Self {
        Self::new(format!("step-{}-poll-{}", id, poll_count))
    }

    /// Job id for an init-step dispatch at the given retry count.
    pub fn init(id: InitExecutionId, retry_count: i32) -> Self {
        if retry_count == 0 {
            Self::new(format!("init-{}", id))
        } else {
            Self::new(format!("init-{}-retry-{}", id, retry_count))
        }
    }

    /// Job id for a poll call against an in-progress init step.
    pub fn init_poll(id: InitExecutionId, poll_count: i32) -> Self {
        Self::new(format!("init-{}-poll-{}", id, poll_count))
    }

    /// Job id for a fire-and-forget step (rollbacks, member-removed
    /// sequences) that has no tracked execution row. Not deterministic;
    /// such steps are intentionally outside the dedup window.
    pub fn fire_and_forget(kind: &str, nonce: &str) -> Self {
        Self::new(format!("{}-{}", kind, nonce))
    }

    /// Returns true if this id addresses an init execution.
    pub fn is_init(&self) -> bool {
        self.0.starts_with("init-")
    }

    /// Returns true if this id addresses a step execution.
    pub fn is_step(&self) -> bool {
        self.0.starts_with("step-")
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
