//! Five-field cron pattern parsing ("MIN HOUR DOM MON DOW").
//!
//! Supports `*`, `*/N`, ranges (`8-12`), comma lists (`0,30`) and single
//! values per field. Day-of-week uses 0 or 7 for Sunday. When both
//! day-of-month and day-of-week are restricted, a day must match both.
//! This covers every pattern the sync schedules use (hourly, daily, and
//! several-times-daily) without pulling in a full cron dialect.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use thiserror::Error;

/// A parse failure for a cron pattern.
#[derive(Debug, Error)]
#[error("invalid cron pattern {pattern:?}: {reason}")]
pub struct CronPatternError {
    pattern: String,
    reason: String,
}

/// A parsed recurring calendar pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
}

impl CronPattern {
    /// Parse a five-field cron expression.
    pub fn parse(pattern: &str) -> Result<Self, CronPatternError> {
        let fail = |reason: &str| CronPatternError {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        let fields: Vec<&str> = pattern.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(fail("expected 5 fields (MIN HOUR DOM MON DOW)"));
        };

        Ok(Self {
            minutes: parse_field(minute, 0, 59).ok_or_else(|| fail("bad minute field"))?,
            hours: parse_field(hour, 0, 23).ok_or_else(|| fail("bad hour field"))?,
            days_of_month: parse_field(dom, 1, 31).ok_or_else(|| fail("bad day-of-month field"))?,
            months: parse_field(month, 1, 12).ok_or_else(|| fail("bad month field"))?,
            days_of_week: parse_field(dow, 0, 7)
                .map(normalize_sundays)
                .ok_or_else(|| fail("bad day-of-week field"))?,
        })
    }

    /// The next fire time strictly after `after`, at minute resolution.
    ///
    /// Returns `None` only for patterns that never match a real date (e.g.
    /// day-of-month 31 in a run of short months beyond the scan horizon).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut day = after.date_naive();

        // Scan a little over a year of days; enough for any yearly pattern.
        for _ in 0..=367 {
            if self.matches_day(day) {
                for &hour in &self.hours {
                    for &minute in &self.minutes {
                        let candidate = day.and_hms_opt(hour, minute, 0)?.and_utc();
                        if candidate > after {
                            return Some(candidate);
                        }
                    }
                }
            }
            day = day.succ_opt()?;
        }

        None
    }

    fn matches_day(&self, day: NaiveDate) -> bool {
        self.days_of_month.contains(&day.day())
            && self.months.contains(&day.month())
            && self
                .days_of_week
                .contains(&day.weekday().num_days_from_sunday())
    }
}

// Cron allows both 0 and 7 for Sunday.
fn normalize_sundays(mut values: Vec<u32>) -> Vec<u32> {
    for value in &mut values {
        if *value == 7 {
            *value = 0;
        }
    }
    values.sort_unstable();
    values.dedup();
    values
}

/// Parse one cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();

    for part in field.split(',') {
        let part = part.trim();
        if part == "*" {
            values.extend(min..=max);
        } else if let Some(step) = part.strip_prefix("*/") {
            let step: u32 = step.parse().ok()?;
            if step == 0 {
                return None;
            }
            values.extend((min..=max).step_by(step as usize));
        } else if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.parse().ok()?;
            let end: u32 = end.parse().ok()?;
            if start > end || start < min || end > max {
                return None;
            }
            values.extend(start..=end);
        } else {
            let value: u32 = part.parse().ok()?;
            if value < min || value > max {
                return None;
            }
            values.push(value);
        }
    }

    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    values.dedup();
    Some(values)
}
