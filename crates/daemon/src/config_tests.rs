// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("convoy.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn minimal_config_fills_defaults() {
    let (_dir, path) = write_config(
        r#"
[database]
url = "postgres://localhost/convoy"
"#,
    );
    let config = Config::load_from(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.scheduler.tick_interval_secs, 300);
    assert_eq!(config.orchestrator.handler_concurrency, 16);
    assert_eq!(config.orchestrator.shutdown_grace_secs, 30);
    assert_eq!(config.bus.dedup_window_minutes, 10);

    let engine = config.engine_config();
    assert_eq!(engine.topics.orchestrator_events, "orchestrator-events");
    assert_eq!(engine.tick_interval.as_secs(), 300);
}

#[test]
fn missing_database_url_is_fatal() {
    let (_dir, path) = write_config("[database]\n");
    let config = Config::load_from(&path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Missing("database.url")));
}

#[test]
fn missing_file_is_reported_with_path() {
    let path = PathBuf::from("/nonexistent/convoy.toml");
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn unparseable_file_is_a_parse_error() {
    let (_dir, path) = write_config("not [ toml");
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn namespace_prefixes_topics() {
    let (_dir, path) = write_config(
        r#"
[database]
url = "postgres://localhost/convoy"

[bus]
namespace = "contoso-migrations"
"#,
    );
    let config = Config::load_from(&path).unwrap();
    let engine = config.engine_config();
    assert_eq!(
        engine.topics.worker_jobs,
        "contoso-migrations/worker-jobs"
    );
}

#[test]
fn full_config_round_trips() {
    let (_dir, path) = write_config(
        r#"
[database]
url = "postgres://localhost/convoy"
max_connections = 4

[bus]
orchestrator_events_topic = "events"
dedup_window_minutes = 20

[scheduler]
tick_interval_secs = 60
query_timeout_secs = 120
lock_ttl_secs = 120

[orchestrator]
handler_concurrency = 4
shutdown_grace_secs = 10
poll_safety_secs = 5

[sources]
hr-warehouse = "postgres://warehouse/hr"
"#,
    );
    let config = Config::load_from(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.database.max_connections, 4);
    assert_eq!(config.sources["hr-warehouse"], "postgres://warehouse/hr");

    let engine = config.engine_config();
    assert_eq!(engine.topics.orchestrator_events, "events");
    assert_eq!(engine.query_timeout.as_secs(), 120);
    assert_eq!(engine.handler_concurrency, 4);
    assert_eq!(engine.poll_safety_secs, 5);
}
