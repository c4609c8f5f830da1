// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let start = clock.now();
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now() - start, Duration::minutes(5));
}

#[test]
fn fake_clock_set() {
    let clock = FakeClock::new();
    let t = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
    clock.set(t);
    assert_eq!(clock.now(), t);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::seconds(30));
    assert_eq!(other.now(), clock.now());
}

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
