// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    dispatch        = { StepStatus::Pending, StepStatus::Dispatched, true },
    cancel_pending  = { StepStatus::Pending, StepStatus::Cancelled, true },
    fail_unresolved = { StepStatus::Pending, StepStatus::Failed, true },
    succeed         = { StepStatus::Dispatched, StepStatus::Succeeded, true },
    fail            = { StepStatus::Dispatched, StepStatus::Failed, true },
    start_polling   = { StepStatus::Dispatched, StepStatus::Polling, true },
    retry           = { StepStatus::Dispatched, StepStatus::Pending, true },
    poll_succeed    = { StepStatus::Polling, StepStatus::Succeeded, true },
    poll_fail       = { StepStatus::Polling, StepStatus::Failed, true },
    poll_timeout    = { StepStatus::Polling, StepStatus::PollTimeout, true },
    poll_retry      = { StepStatus::Polling, StepStatus::Pending, true },
    no_skip         = { StepStatus::Pending, StepStatus::Succeeded, false },
    no_resurrect    = { StepStatus::Succeeded, StepStatus::Pending, false },
    no_timeout_jump = { StepStatus::Dispatched, StepStatus::PollTimeout, false },
    cancelled_sink  = { StepStatus::Cancelled, StepStatus::Dispatched, false },
    failed_sink     = { StepStatus::Failed, StepStatus::Pending, false },
)]
fn step_transitions(from: StepStatus, to: StepStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed);
}

#[yare::parameterized(
    dispatch   = { PhaseStatus::Pending, PhaseStatus::Dispatched, true },
    skip       = { PhaseStatus::Pending, PhaseStatus::Skipped, true },
    supersede  = { PhaseStatus::Pending, PhaseStatus::Superseded, true },
    complete   = { PhaseStatus::Dispatched, PhaseStatus::Completed, true },
    fail       = { PhaseStatus::Dispatched, PhaseStatus::Failed, true },
    no_skip_dispatched  = { PhaseStatus::Dispatched, PhaseStatus::Skipped, false },
    no_supersede_done   = { PhaseStatus::Completed, PhaseStatus::Superseded, false },
    no_pending_complete = { PhaseStatus::Pending, PhaseStatus::Completed, false },
)]
fn phase_transitions(from: PhaseStatus, to: PhaseStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed);
}

#[test]
fn step_terminal_statuses() {
    for s in [
        StepStatus::Succeeded,
        StepStatus::Failed,
        StepStatus::PollTimeout,
        StepStatus::Cancelled,
    ] {
        assert!(s.is_terminal(), "{s} should be terminal");
    }
    for s in [StepStatus::Pending, StepStatus::Dispatched, StepStatus::Polling] {
        assert!(!s.is_terminal(), "{s} should not be terminal");
    }
}

#[test]
fn phase_terminal_statuses() {
    for s in [
        PhaseStatus::Completed,
        PhaseStatus::Skipped,
        PhaseStatus::Failed,
        PhaseStatus::Superseded,
    ] {
        assert!(s.is_terminal(), "{s} should be terminal");
    }
    assert!(!PhaseStatus::Pending.is_terminal());
    assert!(!PhaseStatus::Dispatched.is_terminal());
}

#[test]
fn step_status_wire_format_is_lowercase() {
    assert_eq!(
        serde_json::to_string(&StepStatus::PollTimeout).unwrap(),
        "\"poll_timeout\""
    );
    assert_eq!(StepStatus::PollTimeout.to_string(), "poll_timeout");
    assert_eq!(
        "poll_timeout".parse::<StepStatus>().unwrap(),
        StepStatus::PollTimeout
    );
}

#[test]
fn every_status_round_trips_through_from_str() {
    for s in [
        StepStatus::Pending,
        StepStatus::Dispatched,
        StepStatus::Polling,
        StepStatus::Succeeded,
        StepStatus::Failed,
        StepStatus::PollTimeout,
        StepStatus::Cancelled,
    ] {
        assert_eq!(s.to_string().parse::<StepStatus>().unwrap(), s);
    }
    for s in [
        PhaseStatus::Pending,
        PhaseStatus::Dispatched,
        PhaseStatus::Completed,
        PhaseStatus::Skipped,
        PhaseStatus::Failed,
        PhaseStatus::Superseded,
    ] {
        assert_eq!(s.to_string().parse::<PhaseStatus>().unwrap(), s);
    }
}
