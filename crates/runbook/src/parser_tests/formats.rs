// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Happy-path parsing across TOML, HCL, and JSON

use super::MINIMAL;
use crate::{
    parse_runbook, parse_runbook_with_format, BatchTiming, Format, SourceType, ValueFormat,
};

#[test]
fn minimal_toml_parses() {
    let rb = parse_runbook(MINIMAL).unwrap();
    assert_eq!(rb.name, "rb1");
    assert_eq!(rb.data_source.source_type, SourceType::Sql);
    assert_eq!(
        rb.data_source.batch_timing(),
        BatchTiming::Column("MigrationDate")
    );
    assert_eq!(rb.phases.len(), 1);
    assert_eq!(rb.phases[0].name, "prepare");
    assert_eq!(rb.phases[0].steps[0].name, "get-mailbox");
    assert!(rb.init.is_empty());
    assert!(rb.rollbacks.is_empty());
}

#[test]
fn full_toml_parses() {
    let toml = r#"
name = "rb2"
description = "two phase migration"

[data_source]
type = "databricks"
connection = "workspace-url"
warehouse_id = "wh-1"
query = "SELECT * FROM members"
primary_key = "Upn"
batch_time = "immediate"

[[data_source.multi_valued_columns]]
name = "Aliases"
format = "semicolon_delimited"

[retry]
max_retries = 2
interval = "30s"

[[init]]
name = "create-groups"
worker_id = "identity-worker"
function = "create-groups"

[[phase]]
name = "prepare"
offset = "T-1h"

[[phase.step]]
name = "get-mailbox"
worker_id = "mailbox-worker"
function = "get-mailbox"
[phase.step.params]
User = "{{Upn}}"
[phase.step.output_params]
MailboxGuid = "mailboxGuid"

[[phase]]
name = "cutover"
offset = "T-0"

[[phase.step]]
name = "set-guids"
worker_id = "mailbox-worker"
function = "set-guids"
on_failure = "cleanup"
[phase.step.params]
Guid = "{{MailboxGuid}}"
[phase.step.poll]
interval = "5m"
timeout = "1h"

[[on_member_removed]]
name = "notify-removed"
worker_id = "notification-worker"
function = "send-removed-notice"

[[rollbacks.cleanup]]
name = "undo-guids"
worker_id = "mailbox-worker"
function = "undo-guids"
"#;
    let rb = parse_runbook(toml).unwrap();
    assert_eq!(rb.data_source.batch_timing(), BatchTiming::Immediate);
    assert_eq!(
        rb.data_source.multi_valued_format("Aliases"),
        Some(ValueFormat::SemicolonDelimited)
    );
    assert_eq!(rb.init.len(), 1);
    assert_eq!(rb.phases.len(), 2);
    assert_eq!(rb.phases[1].steps[0].on_failure.as_deref(), Some("cleanup"));
    let poll = rb.phases[1].steps[0].poll.as_ref().unwrap();
    assert_eq!(poll.interval, "5m");
    assert_eq!(rb.on_member_removed.len(), 1);
    assert_eq!(rb.rollbacks["cleanup"][0].name, "undo-guids");

    let retry = rb.effective_retry(&rb.phases[0].steps[0]);
    assert_eq!(retry.max_retries, 2);
}

#[test]
fn hcl_labeled_blocks_parse() {
    let hcl = r#"
name = "rb1"
description = "hcl flavored"

data_source {
  type = "sql"
  connection = "Server=src"
  query = "SELECT * FROM members"
  primary_key = "Upn"
  batch_time = "immediate"
}

phase "prepare" {
  offset = "T-30m"
  step "get-mailbox" {
    worker_id = "mailbox-worker"
    function = "get-mailbox"
  }
  step "stage-data" {
    worker_id = "drive-worker"
    function = "stage-data"
  }
}

rollback "cleanup" {
  step "undo" {
    worker_id = "mailbox-worker"
    function = "undo"
  }
}
"#;
    let rb = parse_runbook_with_format(hcl, Format::Hcl).unwrap();
    assert_eq!(rb.phases.len(), 1);
    assert_eq!(rb.phases[0].name, "prepare");
    // Labeled blocks preserve declaration order
    assert_eq!(rb.phases[0].steps[0].name, "get-mailbox");
    assert_eq!(rb.phases[0].steps[1].name, "stage-data");
    assert_eq!(rb.rollbacks["cleanup"][0].name, "undo");
}

#[test]
fn json_parses() {
    let json = r#"{
  "name": "rb1",
  "data_source": {
    "type": "dataverse",
    "connection": "env-url",
    "query": "members",
    "primary_key": "Upn",
    "batch_time_column": "Date",
    "multi_valued_columns": [{"name": "Tags", "format": "json_array"}]
  },
  "phases": [
    {
      "name": "prepare",
      "offset": "T-0",
      "steps": [
        {"name": "s", "worker_id": "w", "function": "f"}
      ]
    }
  ],
  "rollbacks": {
    "cleanup": [{"name": "undo", "worker_id": "w", "function": "f"}]
  }
}"#;
    let rb = parse_runbook_with_format(json, Format::Json).unwrap();
    assert_eq!(rb.data_source.source_type, SourceType::Dataverse);
    assert_eq!(
        rb.data_source.multi_valued_format("Tags"),
        Some(ValueFormat::JsonArray)
    );
    assert_eq!(rb.rollbacks["cleanup"].len(), 1);
}

#[test]
fn unknown_fields_are_ignored() {
    let toml = format!("{}\nfuture_field = \"ok\"\n", MINIMAL);
    assert!(parse_runbook(&toml).is_ok());
}

#[test]
fn max_retries_zero_disables_retry_even_with_global_default() {
    let toml = r#"
name = "rb1"

[retry]
max_retries = 3
interval = "1m"

[data_source]
type = "sql"
connection = "c"
query = "q"
primary_key = "k"
batch_time = "immediate"

[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
[phase.step.retry]
max_retries = 0
interval = "1s"
"#;
    let rb = parse_runbook(toml).unwrap();
    let retry = rb.effective_retry(&rb.phases[0].steps[0]);
    assert_eq!(retry.max_retries, 0);
}
