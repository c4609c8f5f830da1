// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offset (`T-…`) and duration string parsing
//!
//! Offsets measure how long *before* `batch_start_time` a phase fires and
//! normalize to whole minutes; sub-minute offsets round up so a phase never
//! dispatches early. Durations (`30s`, `15m`, …) normalize to seconds.

/// Unit an offset was written in, kept so formatting reproduces the
/// author's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl OffsetUnit {
    fn suffix(&self) -> char {
        match self {
            OffsetUnit::Days => 'd',
            OffsetUnit::Hours => 'h',
            OffsetUnit::Minutes => 'm',
            OffsetUnit::Seconds => 's',
        }
    }
}

/// A parsed phase offset: whole minutes before batch start, plus the unit
/// it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub minutes: i64,
    pub unit: OffsetUnit,
}

/// Parse an offset string: `T-0` or `T-<n>{d|h|m|s}` with `n > 0`.
///
/// Seconds are ceil-divided into minutes (`T-90s` → 2 minutes).
pub fn parse_offset(s: &str) -> Result<Offset, String> {
    let rest = s
        .strip_prefix("T-")
        .ok_or_else(|| format!("offset must start with 'T-': {}", s))?;

    if rest == "0" {
        return Ok(Offset {
            minutes: 0,
            unit: OffsetUnit::Minutes,
        });
    }

    if rest.is_empty() {
        return Err(format!("empty offset value: {}", s));
    }

    let (num_str, suffix) = rest.split_at(rest.len() - 1);
    let n: i64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in offset: {}", s))?;
    if n <= 0 {
        return Err(format!("offset value must be positive: {}", s));
    }

    let (minutes, unit) = match suffix {
        "d" => (n * 1440, OffsetUnit::Days),
        "h" => (n * 60, OffsetUnit::Hours),
        "m" => (n, OffsetUnit::Minutes),
        // Round up so sub-minute precision never dispatches early.
        "s" => ((n + 59) / 60, OffsetUnit::Seconds),
        other => return Err(format!("unknown offset unit '{}' in: {}", other, s)),
    };

    Ok(Offset { minutes, unit })
}

/// Format an offset back into its `T-…` spelling.
///
/// Re-parsing the result always yields the same `minutes`.
pub fn format_offset(offset: Offset) -> String {
    if offset.minutes == 0 {
        return "T-0".to_string();
    }
    let n = match offset.unit {
        OffsetUnit::Days => offset.minutes / 1440,
        OffsetUnit::Hours => offset.minutes / 60,
        OffsetUnit::Minutes => offset.minutes,
        OffsetUnit::Seconds => offset.minutes * 60,
    };
    format!("T-{}{}", n, offset.unit.suffix())
}

/// Parse a duration string `<n>{s|m|h|d}` into whole seconds.
pub fn parse_duration_secs(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num_str, suffix) = s.split_at(s.len() - 1);
    let n: i64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {}", s))?;
    if n < 0 {
        return Err(format!("duration must not be negative: {}", s));
    }

    match suffix {
        "s" => Ok(n),
        "m" => Ok(n * 60),
        "h" => Ok(n * 3600),
        "d" => Ok(n * 86400),
        other => Err(format!("unknown duration suffix '{}' in: {}", other, s)),
    }
}

#[cfg(test)]
#[path = "offset_tests.rs"]
mod tests;
