// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source rows and snapshot construction
//!
//! Rows come back from the query layer as column → string cells. Before a
//! member is inserted, the row is frozen into `data_json`: multi-valued
//! columns are split per their declared format, and the batch-time column
//! is parsed into a UTC timestamp.

use chrono::{DateTime, NaiveDateTime, Utc};
use convoy_runbook::{DataSourceDef, ValueFormat};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One row from the data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    pub columns: HashMap<String, String>,
}

impl SourceRow {
    pub fn new(columns: HashMap<String, String>) -> Self {
        Self { columns }
    }

    /// Build a row from string pairs (test and fixture convenience).
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            columns: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(|s| s.as_str())
    }

    /// The member key for this row, per the source's `primary_key`.
    pub fn member_key(&self, config: &DataSourceDef) -> Option<&str> {
        self.get(&config.primary_key)
    }

    /// The parsed batch time for this row, when the source batches by
    /// column. `None` when the cell is missing or unparseable.
    pub fn batch_time(&self, config: &DataSourceDef) -> Option<DateTime<Utc>> {
        let column = config.batch_time_column.as_deref()?;
        parse_batch_time(self.get(column)?)
    }

    /// Freeze this row into the member's `data_json` snapshot.
    ///
    /// Multi-valued columns become JSON arrays per their declared format;
    /// everything else is kept as the raw string cell.
    pub fn freeze(&self, config: &DataSourceDef) -> Value {
        let mut object = Map::new();
        for (column, cell) in &self.columns {
            let value = match config.multi_valued_format(column) {
                Some(format) => split_multi_valued(cell, format),
                None => Value::String(cell.clone()),
            };
            object.insert(column.clone(), value);
        }
        Value::Object(object)
    }
}

/// Parse a batch-time cell: RFC 3339 first, then `%Y-%m-%d %H:%M:%S`
/// interpreted as UTC.
pub fn parse_batch_time(cell: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(cell) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Split a multi-valued cell into a JSON array.
///
/// A `json_array` cell that fails to parse as an array degrades to a
/// single-element array holding the raw string.
pub fn split_multi_valued(cell: &str, format: ValueFormat) -> Value {
    match format {
        ValueFormat::SemicolonDelimited => delimited(cell, ';'),
        ValueFormat::CommaDelimited => delimited(cell, ','),
        ValueFormat::JsonArray => match serde_json::from_str::<Value>(cell) {
            Ok(Value::Array(items)) => Value::Array(items),
            _ => Value::Array(vec![Value::String(cell.to_string())]),
        },
    }
}

fn delimited(cell: &str, separator: char) -> Value {
    Value::Array(
        cell.split(separator)
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect(),
    )
}

#[cfg(test)]
#[path = "row_tests.rs"]
mod tests;
