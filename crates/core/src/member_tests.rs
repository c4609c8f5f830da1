// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use serde_json::json;

fn member(data: Value, worker: Value) -> BatchMember {
    BatchMember {
        id: MemberId::new(1),
        batch_id: BatchId::new(1),
        member_key: "u1".to_string(),
        status: MemberStatus::Active,
        data_json: data,
        worker_data_json: worker,
        added_at: Utc::now(),
        removed_at: None,
        add_dispatched_at: None,
        remove_dispatched_at: None,
    }
}

#[test]
fn merged_data_worker_wins() {
    let m = member(
        json!({"Name": "Alice", "Region": "EU"}),
        json!({"Region": "US", "MailboxGuid": "abc"}),
    );
    let merged = m.merged_data();
    assert_eq!(merged["Name"], json!("Alice"));
    assert_eq!(merged["Region"], json!("US"));
    assert_eq!(merged["MailboxGuid"], json!("abc"));
}

#[test]
fn merged_data_tolerates_non_objects() {
    let m = member(json!(null), json!({"k": "v"}));
    assert_eq!(m.merged_data()["k"], json!("v"));
}

#[yare::parameterized(
    remove    = { MemberStatus::Active, MemberStatus::Removed, true },
    fail      = { MemberStatus::Active, MemberStatus::Failed, true },
    reappear  = { MemberStatus::Removed, MemberStatus::Active, true },
    dead_end  = { MemberStatus::Failed, MemberStatus::Active, false },
    no_noop   = { MemberStatus::Removed, MemberStatus::Failed, false },
)]
fn transitions(from: MemberStatus, to: MemberStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed);
}
