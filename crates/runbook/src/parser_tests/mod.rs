// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser test helpers and shared fixtures

mod errors;
mod formats;

use crate::{parse_runbook, ValidationError};

/// Minimal valid scheduled runbook in TOML.
pub(crate) const MINIMAL: &str = r#"
name = "rb1"
description = "mailbox migration"

[data_source]
type = "sql"
connection = "Server=source;Database=migrations"
query = "SELECT * FROM members"
primary_key = "UserPrincipalName"
batch_time_column = "MigrationDate"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "get-mailbox"
worker_id = "mailbox-worker"
function = "get-mailbox"
"#;

/// Assert a document fails validation with an error naming all fragments.
pub(crate) fn assert_invalid(toml: &str, fragments: &[&str]) {
    let err = parse_runbook(toml).unwrap_err();
    let msg = err.to_string();
    assert!(
        matches!(err, ValidationError::Invalid { .. }),
        "expected Invalid, got: {msg}"
    );
    for fragment in fragments {
        assert!(
            msg.contains(fragment),
            "error should mention '{fragment}': {msg}"
        );
    }
}
