// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{floor_to_bucket, format_utc};
use chrono::{TimeZone, Utc};

#[test]
fn format_is_rfc3339_zulu() {
    let t = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
    assert_eq!(format_utc(t), "2030-01-01T10:00:00Z");
}

#[yare::parameterized(
    on_boundary   = { 0,  0 },
    just_after    = { 2,  0 },
    mid_bucket    = { 7,  5 },
    end_of_bucket = { 9,  5 },
    next_bucket   = { 12, 10 },
)]
fn five_minute_floor(minute: u32, expected_minute: u32) {
    let t = Utc.with_ymd_and_hms(2030, 6, 1, 12, minute, 33).unwrap();
    let floored = floor_to_bucket(t, 5);
    assert_eq!(
        floored,
        Utc.with_ymd_and_hms(2030, 6, 1, 12, expected_minute, 0).unwrap()
    );
}
