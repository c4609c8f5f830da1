// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration
//!
//! Loaded once at startup from a TOML file (`CONVOY_CONFIG` or
//! `./convoy.toml`), with the database URL overridable via
//! `CONVOY_DATABASE_URL`. Missing required values refuse startup.

use convoy_engine::{EngineConfig, Topics};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required config: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Namespace prefix applied to every topic name.
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_events_topic")]
    pub orchestrator_events_topic: String,
    #[serde(default = "default_jobs_topic")]
    pub worker_jobs_topic: String,
    #[serde(default = "default_results_topic")]
    pub worker_results_topic: String,
    /// Duplicate-detection window for deterministic job ids.
    #[serde(default = "default_dedup_window_minutes")]
    pub dedup_window_minutes: i64,
}

fn default_events_topic() -> String {
    "orchestrator-events".to_string()
}

fn default_jobs_topic() -> String {
    "worker-jobs".to_string()
}

fn default_results_topic() -> String {
    "worker-results".to_string()
}

fn default_dedup_window_minutes() -> i64 {
    10
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            orchestrator_events_topic: default_events_topic(),
            worker_jobs_topic: default_jobs_topic(),
            worker_results_topic: default_results_topic(),
            dedup_window_minutes: default_dedup_window_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: i64,
}

fn default_tick_secs() -> u64 {
    300
}

fn default_query_timeout_secs() -> u64 {
    90
}

fn default_lock_ttl_secs() -> i64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_concurrency")]
    pub handler_concurrency: usize,
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_poll_safety_secs")]
    pub poll_safety_secs: i64,
}

fn default_concurrency() -> usize {
    16
}

fn default_grace_secs() -> u64 {
    30
}

fn default_poll_safety_secs() -> i64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            handler_concurrency: default_concurrency(),
            shutdown_grace_secs: default_grace_secs(),
            poll_safety_secs: default_poll_safety_secs(),
        }
    }
}

/// Process-wide daemon configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Per-data-source connection descriptors, keyed by the alias a
    /// runbook's `data_source.connection` names.
    #[serde(default)]
    pub sources: HashMap<String, String>,
    /// Log file; stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Load from `CONVOY_CONFIG` (or `./convoy.toml`), apply environment
    /// overrides, and check required values.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("CONVOY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("convoy.toml"));
        let mut config = Self::load_from(&path)?;
        if let Ok(url) = std::env::var("CONVOY_DATABASE_URL") {
            config.database.url = url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Missing("database.url"));
        }
        Ok(())
    }

    fn scoped(&self, topic: &str) -> String {
        if self.bus.namespace.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{}", self.bus.namespace, topic)
        }
    }

    /// The immutable engine settings derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            topics: Topics {
                orchestrator_events: self.scoped(&self.bus.orchestrator_events_topic),
                worker_jobs: self.scoped(&self.bus.worker_jobs_topic),
                worker_results: self.scoped(&self.bus.worker_results_topic),
            },
            subscription: "orchestrator".to_string(),
            tick_interval: Duration::from_secs(self.scheduler.tick_interval_secs),
            query_timeout: Duration::from_secs(self.scheduler.query_timeout_secs),
            handler_concurrency: self.orchestrator.handler_concurrency,
            shutdown_grace: Duration::from_secs(self.orchestrator.shutdown_grace_secs),
            lock_ttl_secs: self.scheduler.lock_ttl_secs,
            poll_safety_secs: self.orchestrator.poll_safety_secs,
            immediate_bucket_minutes: 5,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
