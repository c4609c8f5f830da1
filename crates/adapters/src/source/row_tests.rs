// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use convoy_runbook::{parse_runbook, RunbookDef};
use serde_json::json;

fn source_with_multi_valued() -> RunbookDef {
    parse_runbook(
        r#"
name = "rb1"

[data_source]
type = "sql"
connection = "c"
query = "q"
primary_key = "Upn"
batch_time_column = "Date"

[[data_source.multi_valued_columns]]
name = "Aliases"
format = "semicolon_delimited"

[[data_source.multi_valued_columns]]
name = "Tags"
format = "json_array"

[[phase]]
name = "p"
offset = "T-0"

[[phase.step]]
name = "s"
worker_id = "w"
function = "f"
"#,
    )
    .unwrap()
}

#[test]
fn member_key_reads_primary_key_column() {
    let rb = source_with_multi_valued();
    let row = SourceRow::from_pairs(&[("Upn", "u1@contoso.com"), ("Date", "x")]);
    assert_eq!(row.member_key(&rb.data_source), Some("u1@contoso.com"));
}

#[yare::parameterized(
    rfc3339        = { "2030-01-01T10:00:00Z" },
    rfc3339_offset = { "2030-01-01T12:00:00+02:00" },
    sql_style      = { "2030-01-01 10:00:00" },
)]
fn batch_time_parses(cell: &str) {
    let rb = source_with_multi_valued();
    let row = SourceRow::from_pairs(&[("Upn", "u1"), ("Date", cell)]);
    assert_eq!(
        row.batch_time(&rb.data_source),
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap())
    );
}

#[test]
fn unparseable_batch_time_is_none() {
    let rb = source_with_multi_valued();
    let row = SourceRow::from_pairs(&[("Upn", "u1"), ("Date", "next tuesday")]);
    assert!(row.batch_time(&rb.data_source).is_none());
}

#[test]
fn freeze_splits_multi_valued_columns() {
    let rb = source_with_multi_valued();
    let row = SourceRow::from_pairs(&[
        ("Upn", "u1"),
        ("Aliases", "a@x.com; b@x.com ;"),
        ("Tags", r#"["vip", "wave1"]"#),
    ]);
    let frozen = row.freeze(&rb.data_source);
    assert_eq!(frozen["Upn"], json!("u1"));
    assert_eq!(frozen["Aliases"], json!(["a@x.com", "b@x.com"]));
    assert_eq!(frozen["Tags"], json!(["vip", "wave1"]));
}

#[test]
fn malformed_json_array_degrades_to_single_element() {
    assert_eq!(
        split_multi_valued("not json", ValueFormat::JsonArray),
        json!(["not json"])
    );
}

#[yare::parameterized(
    semicolon = { "a;b;c", ValueFormat::SemicolonDelimited },
    comma     = { "a,b,c", ValueFormat::CommaDelimited },
)]
fn delimited_formats_split(cell: &str, format: ValueFormat) {
    assert_eq!(split_multi_valued(cell, format), json!(["a", "b", "c"]));
}

#[test]
fn empty_cell_splits_to_empty_array() {
    assert_eq!(
        split_multi_valued("", ValueFormat::SemicolonDelimited),
        json!([])
    );
}
