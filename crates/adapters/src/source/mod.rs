// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tabular data-source seam

#[cfg(any(test, feature = "test-support"))]
mod fake;
mod row;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSource, SourceCall};
pub use row::SourceRow;

use async_trait::async_trait;
use convoy_runbook::DataSourceDef;
use thiserror::Error;

/// Errors from a data-source query.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The query exceeded its deadline; the scheduler skips the runbook
    /// for this tick and retries next tick.
    #[error("query timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("query failed: {0}")]
    Query(String),

    #[error("unsupported source type: {0}")]
    Unsupported(String),
}

/// A tabular query engine: `execute(config) → rows`.
///
/// Implementations are external collaborators; the engine only consumes
/// the member-key → column mapping the rows carry.
#[async_trait]
pub trait SourceClient: Send + Sync + 'static {
    async fn execute(&self, config: &DataSourceDef) -> Result<Vec<SourceRow>, SourceError>;
}
