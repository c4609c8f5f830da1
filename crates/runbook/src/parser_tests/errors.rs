// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation contract: every rejection case with its field path

use super::assert_invalid;
use crate::{parse_runbook, ValidationError};

fn doc(data_source: &str, body: &str) -> String {
    format!(
        r#"
name = "rb1"

[data_source]
{data_source}

{body}
"#
    )
}

const VALID_SOURCE: &str = r#"type = "sql"
connection = "c"
query = "q"
primary_key = "k"
batch_time = "immediate""#;

const VALID_PHASE: &str = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
"#;

#[test]
fn missing_runbook_name() {
    let toml = format!(
        "[data_source]\n{VALID_SOURCE}\n{VALID_PHASE}"
    );
    assert_invalid(&toml, &["name", "required"]);
}

#[test]
fn unknown_source_type_is_a_parse_error() {
    let source = VALID_SOURCE.replace("\"sql\"", "\"oracle\"");
    let err = parse_runbook(&doc(&source, VALID_PHASE)).unwrap_err();
    assert!(matches!(err, ValidationError::Toml(_)), "got: {err}");
}

#[test]
fn databricks_requires_warehouse_id() {
    let source = VALID_SOURCE.replace("\"sql\"", "\"databricks\"");
    assert_invalid(&doc(&source, VALID_PHASE), &["warehouse_id", "databricks"]);
}

#[test]
fn missing_batch_timing() {
    let source = VALID_SOURCE.replace("batch_time = \"immediate\"", "");
    assert_invalid(
        &doc(&source, VALID_PHASE),
        &["data_source.batch_time", "batch_time_column"],
    );
}

#[test]
fn both_batch_timings() {
    let source = format!("{}\nbatch_time_column = \"Date\"", VALID_SOURCE);
    assert_invalid(
        &doc(&source, VALID_PHASE),
        &["data_source.batch_time", "mutually exclusive"],
    );
}

#[test]
fn non_immediate_batch_time_literal() {
    let source = VALID_SOURCE.replace("\"immediate\"", "\"hourly\"");
    assert_invalid(&doc(&source, VALID_PHASE), &["immediate", "hourly"]);
}

#[test]
fn unknown_multi_valued_format_is_a_parse_error() {
    let source = format!(
        "{}\n[[data_source.multi_valued_columns]]\nname = \"Tags\"\nformat = \"pipe_delimited\"",
        VALID_SOURCE
    );
    let err = parse_runbook(&doc(&source, VALID_PHASE)).unwrap_err();
    assert!(matches!(err, ValidationError::Toml(_)), "got: {err}");
}

#[test]
fn empty_phases_rejected() {
    assert_invalid(&doc(VALID_SOURCE, ""), &["phases", "at least one"]);
}

#[test]
fn empty_steps_rejected() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["phases[0](p).steps", "at least one"]);
}

#[test]
fn duplicate_phase_names_rejected() {
    let body = format!("{VALID_PHASE}{VALID_PHASE}");
    assert_invalid(&doc(VALID_SOURCE, &body), &["duplicate phase name 'p'"]);
}

#[test]
fn duplicate_step_names_rejected() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"

[[phase.step]]
name = "s"
worker_id = "w"
function = "g"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["duplicate step name 's'"]);
}

#[yare::parameterized(
    no_unit      = { "T-5" },
    zero_suffix  = { "T-0m" },
    no_prefix    = { "5m" },
    unknown_unit = { "T-2w" },
)]
fn bad_offsets_rejected(offset: &str) {
    let body = VALID_PHASE.replace("T-0", offset);
    assert_invalid(&doc(VALID_SOURCE, &body), &["offset"]);
}

#[test]
fn missing_step_worker_id() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = ""
function = "f"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["worker_id", "required"]);
}

#[test]
fn unparseable_poll_interval() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
[phase.step.poll]
interval = "soon"
timeout = "1h"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["poll.interval"]);
}

#[test]
fn missing_poll_timeout_is_a_parse_error() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
[phase.step.poll]
interval = "5m"
"#;
    let err = parse_runbook(&doc(VALID_SOURCE, body)).unwrap_err();
    assert!(matches!(err, ValidationError::Toml(_)), "got: {err}");
}

#[test]
fn unknown_rollback_reference() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
on_failure = "missing"

[[rollbacks.cleanup]]
name = "undo"
worker_id = "w"
function = "f"
"#;
    assert_invalid(
        &doc(VALID_SOURCE, body),
        &["on_failure", "unknown rollback 'missing'", "cleanup"],
    );
}

#[test]
fn unbalanced_braces_in_params() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
[phase.step.params]
User = "{{Upn"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["params.User", "unbalanced"]);
}

#[test]
fn unbalanced_braces_in_rollback_params() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"

[[rollbacks.cleanup]]
name = "undo"
worker_id = "w"
function = "f"
[rollbacks.cleanup.params]
User = "Upn}}"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["rollbacks.cleanup", "unbalanced"]);
}

#[test]
fn negative_max_retries_rejected() {
    let body = r#"
[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
[phase.step.retry]
max_retries = -1
interval = "30s"
"#;
    assert_invalid(&doc(VALID_SOURCE, body), &["retry.max_retries"]);
}
