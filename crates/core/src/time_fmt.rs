// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time formatting and bucketing helpers

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Format a UTC timestamp as RFC 3339 with a `Z` suffix and second
/// precision, the canonical form for `_batch_start_time` and message
/// payloads.
pub fn format_utc(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Floor a timestamp down to the nearest `minutes` boundary.
///
/// Used for immediate-batch bucketing (5-minute buckets), so members seen
/// within one bucket land in the same batch.
pub fn floor_to_bucket(t: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::minutes(minutes)).unwrap_or(t)
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
