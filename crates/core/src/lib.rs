// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! convoy-core: shared data model for the Convoy migration orchestrator

pub mod batch;
pub mod clock;
pub mod execution;
pub mod id;
pub mod job;
pub mod member;
pub mod message;
pub mod runbook;
pub mod time_fmt;
pub mod worker;

pub use batch::{Batch, BatchId, BatchStatus};
pub use clock::{Clock, FakeClock, SystemClock};
pub use execution::{
    InitExecution, InitExecutionId, PhaseExecution, PhaseExecutionId, PhaseStatus, StepExecution,
    StepExecutionId, StepStatus,
};
pub use job::JobId;
pub use member::{BatchMember, MemberId, MemberStatus};
pub use message::{
    BatchInitMsg, JobCorrelationData, MemberEventMsg, OrchestratorEvent, PhaseDueMsg, PollCheckMsg,
    PollResult, RetryCheckMsg, WorkerError, WorkerJob, WorkerResult, WorkerResultStatus,
    CONTENT_TYPE_JSON, MESSAGE_TYPE_PROP, WORKER_ID_PROP,
};
pub use runbook::{AutomationSetting, OverdueBehavior, Runbook, RunbookId};
pub use time_fmt::{floor_to_bucket, format_utc};
pub use worker::{WorkerId, WorkerPool, WorkerRoute};
