// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQL data-source client
//!
//! Runs `type = "sql"` runbook queries against Postgres. Dataverse and
//! Databricks engines are external collaborators reached through their own
//! [`SourceClient`] implementations; asking this client for them is an
//! error, not a silent empty result.

use async_trait::async_trait;
use convoy_adapters::{SourceClient, SourceError, SourceRow};
use convoy_runbook::{DataSourceDef, SourceType};
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// [`SourceClient`] over Postgres connections.
///
/// A runbook's `connection` is first looked up as an alias in the
/// configured sources map, else used verbatim as a connection URL. Pools
/// are cached per resolved URL.
pub struct PgSourceClient {
    aliases: HashMap<String, String>,
    pools: Arc<Mutex<HashMap<String, PgPool>>>,
}

impl PgSourceClient {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn pool_for(&self, connection: &str) -> Result<PgPool, SourceError> {
        let url = self
            .aliases
            .get(connection)
            .cloned()
            .unwrap_or_else(|| connection.to_string());
        if let Some(pool) = self.pools.lock().get(&url) {
            return Ok(pool.clone());
        }
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .map_err(|e| SourceError::Query(format!("connect failed: {e}")))?;
        self.pools.lock().insert(url, pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl SourceClient for PgSourceClient {
    async fn execute(&self, config: &DataSourceDef) -> Result<Vec<SourceRow>, SourceError> {
        match config.source_type {
            SourceType::Sql => {}
            other => return Err(SourceError::Unsupported(other.to_string())),
        }

        let pool = self.pool_for(&config.connection).await?;
        let rows = sqlx::query(&config.query)
            .fetch_all(&pool)
            .await
            .map_err(|e| SourceError::Query(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut columns = HashMap::new();
            for column in row.columns() {
                match cell_to_string(&row, column) {
                    Some(value) => {
                        columns.insert(column.name().to_string(), value);
                    }
                    None => {
                        tracing::warn!(
                            column = column.name(),
                            kind = column.type_info().name(),
                            "unsupported column type, skipping"
                        );
                    }
                }
            }
            out.push(SourceRow::new(columns));
        }
        Ok(out)
    }
}

/// Render one cell as a string by column type; `None` for unsupported
/// types (the column is skipped with a warning). Null cells become empty
/// strings so keys stay present in the snapshot.
fn cell_to_string(
    row: &sqlx::postgres::PgRow,
    column: &sqlx::postgres::PgColumn,
) -> Option<String> {
    let index = column.ordinal();
    let value = match column.type_info().name() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(index).ok()?
        }
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()?
            .map(convoy_core::format_utc),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()?
            .map(|v| v.to_string()),
        _ => return None,
    };
    Some(value.unwrap_or_default())
}
