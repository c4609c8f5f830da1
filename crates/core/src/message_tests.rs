// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use serde_json::json;

#[test]
fn event_kind_round_trip() {
    let events = vec![
        OrchestratorEvent::BatchInit(BatchInitMsg {
            runbook_name: "rb1".into(),
            runbook_version: 1,
            batch_id: BatchId::new(1),
            batch_start_time: Some(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap()),
            member_count: 2,
        }),
        OrchestratorEvent::PhaseDue(PhaseDueMsg {
            phase_execution_id: PhaseExecutionId::new(5),
            phase_name: "prepare".into(),
            batch_id: BatchId::new(1),
            runbook_name: "rb1".into(),
            runbook_version: 1,
            offset_minutes: 60,
            due_at: None,
            member_ids: vec![MemberId::new(9)],
        }),
        OrchestratorEvent::MemberAdded(MemberEventMsg {
            runbook_name: "rb1".into(),
            runbook_version: 1,
            batch_id: BatchId::new(1),
            batch_member_id: MemberId::new(9),
            member_key: "u1".into(),
        }),
        OrchestratorEvent::PollCheck(PollCheckMsg {
            step_execution_id: Some(StepExecutionId::new(3)),
            init_execution_id: None,
            poll_count: 2,
        }),
        OrchestratorEvent::RetryCheck(RetryCheckMsg {
            step_execution_id: None,
            init_execution_id: Some(InitExecutionId::new(4)),
            retry_count: 1,
        }),
    ];

    for event in events {
        let body = event.to_body().unwrap();
        let decoded = OrchestratorEvent::from_parts(event.kind(), &body).unwrap();
        assert_eq!(decoded, event);
    }
}

#[test]
fn unknown_kind_is_rejected() {
    let err = OrchestratorEvent::from_parts("batch-done", &json!({})).unwrap_err();
    assert!(matches!(err, MessageDecodeError::UnknownKind(_)));
}

#[test]
fn undecodable_body_is_rejected() {
    let err = OrchestratorEvent::from_parts("batch-init", &json!({"nope": true})).unwrap_err();
    assert!(matches!(err, MessageDecodeError::Body { .. }));
}

#[test]
fn worker_result_status_is_lowercase() {
    let result = WorkerResult {
        job_id: JobId::new("step-1"),
        status: WorkerResultStatus::Success,
        result: None,
        error: None,
        correlation_data: None,
    };
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], json!("success"));
}

#[test]
fn worker_result_parses_without_optional_fields() {
    let parsed: WorkerResult = serde_json::from_value(json!({
        "job_id": "step-9",
        "status": "failure"
    }))
    .unwrap();
    assert_eq!(parsed.status, WorkerResultStatus::Failure);
    assert!(parsed.correlation_data.is_none());
    assert_eq!(parsed.error_message(), "worker reported failure");
}

#[test]
fn poll_shape_detection() {
    let in_progress: WorkerResult = serde_json::from_value(json!({
        "job_id": "step-9",
        "status": "success",
        "result": {"complete": false}
    }))
    .unwrap();
    let poll = in_progress.poll_result().unwrap();
    assert!(!poll.complete);
    assert!(poll.data.is_none());

    let complete: WorkerResult = serde_json::from_value(json!({
        "job_id": "step-9",
        "status": "success",
        "result": {"complete": true, "data": {"mailboxGuid": "abc"}}
    }))
    .unwrap();
    let poll = complete.poll_result().unwrap();
    assert!(poll.complete);
    assert_eq!(poll.data.unwrap()["mailboxGuid"], json!("abc"));
}

#[test]
fn non_poll_shapes_are_not_poll_results() {
    let plain: WorkerResult = serde_json::from_value(json!({
        "job_id": "step-9",
        "status": "success",
        "result": {"mailboxGuid": "abc"}
    }))
    .unwrap();
    assert!(plain.poll_result().is_none());

    let wrong_type: WorkerResult = serde_json::from_value(json!({
        "job_id": "step-9",
        "status": "success",
        "result": {"complete": "yes"}
    }))
    .unwrap();
    assert!(wrong_type.poll_result().is_none());
}

#[test]
fn worker_job_omits_poll_flag_when_false() {
    let job = WorkerJob {
        job_id: JobId::new("step-1"),
        batch_id: BatchId::new(1),
        worker_id: "mailbox-worker".into(),
        function_name: "get-mailbox".into(),
        parameters: HashMap::new(),
        correlation_data: JobCorrelationData {
            step_execution_id: Some(StepExecutionId::new(1)),
            init_execution_id: None,
            is_init_step: false,
            runbook_name: "rb1".into(),
            runbook_version: 1,
        },
        is_poll_call: false,
    };
    let json = serde_json::to_value(&job).unwrap();
    assert!(json.get("is_poll_call").is_none());
}

#[test]
fn log_summaries_name_the_ids() {
    let event = OrchestratorEvent::PollCheck(PollCheckMsg {
        step_execution_id: Some(StepExecutionId::new(3)),
        init_execution_id: None,
        poll_count: 2,
    });
    assert_eq!(event.log_summary(), "poll-check step=3 poll=2");
}
