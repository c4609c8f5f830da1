// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-source block of a runbook

use serde::{Deserialize, Serialize};

/// Supported tabular query engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Dataverse,
    Databricks,
    Sql,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Dataverse => write!(f, "dataverse"),
            SourceType::Databricks => write!(f, "databricks"),
            SourceType::Sql => write!(f, "sql"),
        }
    }
}

/// How a multi-valued source column is encoded in its cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    SemicolonDelimited,
    CommaDelimited,
    JsonArray,
}

/// A source column that carries multiple values per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiValuedColumn {
    pub name: String,
    pub format: ValueFormat,
}

/// How rows are grouped into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTiming<'a> {
    /// Group rows by the parsed value of this column.
    Column(&'a str),
    /// Every row joins the current 5-minute bucket.
    Immediate,
}

/// The `data_source` block: where members come from and how they batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDef {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub connection: String,
    /// Required iff `type = "databricks"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
    pub query: String,
    /// Column whose value becomes `member_key`.
    pub primary_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_time_column: Option<String>,
    /// Only the literal `"immediate"` is meaningful; exclusivity with
    /// `batch_time_column` is checked by the validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_time: Option<String>,
    #[serde(default)]
    pub multi_valued_columns: Vec<MultiValuedColumn>,
}

impl DataSourceDef {
    /// The validated batch timing mode.
    ///
    /// Only meaningful after validation has checked exclusivity; prefers
    /// the column when both are somehow present.
    pub fn batch_timing(&self) -> BatchTiming<'_> {
        match &self.batch_time_column {
            Some(col) => BatchTiming::Column(col),
            None => BatchTiming::Immediate,
        }
    }

    /// The declared format of a column, if it is multi-valued.
    pub fn multi_valued_format(&self, column: &str) -> Option<ValueFormat> {
        self.multi_valued_columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.format)
    }
}
