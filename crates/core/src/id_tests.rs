// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::batch::BatchId;
use crate::worker::WorkerId;

#[test]
fn int_id_display() {
    let id = BatchId::new(42);
    assert_eq!(id.to_string(), "42");
    assert_eq!(id.value(), 42);
}

#[test]
fn int_id_serde_is_transparent() {
    let id = BatchId::new(7);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "7");

    let parsed: BatchId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn int_id_ordering() {
    assert!(BatchId::new(1) < BatchId::new(2));
}

#[test]
fn str_id_display_and_eq() {
    let id = WorkerId::new("mailbox-worker");
    assert_eq!(id.to_string(), "mailbox-worker");
    assert_eq!(id, "mailbox-worker");
}

#[test]
fn str_id_serde_is_transparent() {
    let id = WorkerId::new("w-1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"w-1\"");

    let parsed: WorkerId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
