// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted data source for tests

use super::{SourceClient, SourceError, SourceRow};
use async_trait::async_trait;
use convoy_runbook::DataSourceDef;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Record of one `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCall {
    pub query: String,
    pub connection: String,
}

#[derive(Default)]
struct Inner {
    /// Rows keyed by query text; `rows_once` queues take precedence.
    rows: HashMap<String, Vec<SourceRow>>,
    rows_once: HashMap<String, VecDeque<Vec<SourceRow>>>,
    fail_with: Option<SourceError>,
    calls: Vec<SourceCall>,
}

/// [`SourceClient`] returning scripted rows and recording calls.
#[derive(Clone, Default)]
pub struct FakeSource {
    inner: Arc<Mutex<Inner>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rows every execution of `query` returns.
    pub fn set_rows(&self, query: &str, rows: Vec<SourceRow>) {
        self.inner.lock().rows.insert(query.to_string(), rows);
    }

    /// Queue rows for a single execution of `query`; later calls fall
    /// back to [`FakeSource::set_rows`] values.
    pub fn push_rows_once(&self, query: &str, rows: Vec<SourceRow>) {
        self.inner
            .lock()
            .rows_once
            .entry(query.to_string())
            .or_default()
            .push_back(rows);
    }

    /// Fail the next executions with a timeout.
    pub fn fail_with_timeout(&self, seconds: u64) {
        self.inner.lock().fail_with = Some(SourceError::Timeout { seconds });
    }

    /// Fail the next executions with a query error.
    pub fn fail_with_query_error(&self, message: &str) {
        self.inner.lock().fail_with = Some(SourceError::Query(message.to_string()));
    }

    /// Stop failing.
    pub fn clear_failure(&self) {
        self.inner.lock().fail_with = None;
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn execute(&self, config: &DataSourceDef) -> Result<Vec<SourceRow>, SourceError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SourceCall {
            query: config.query.clone(),
            connection: config.connection.clone(),
        });
        if let Some(error) = &inner.fail_with {
            return Err(match error {
                SourceError::Timeout { seconds } => SourceError::Timeout { seconds: *seconds },
                SourceError::Query(m) => SourceError::Query(m.clone()),
                SourceError::Unsupported(m) => SourceError::Unsupported(m.clone()),
            });
        }
        if let Some(queue) = inner.rows_once.get_mut(&config.query) {
            if let Some(rows) = queue.pop_front() {
                return Ok(rows);
            }
        }
        Ok(inner.rows.get(&config.query).cloned().unwrap_or_default())
    }
}
