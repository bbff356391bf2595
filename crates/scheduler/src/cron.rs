//! A small 5-field cron parser: `minute hour day-of-month month day-of-week`.
//!
//! Supports `*`, `*/N`, `N`, `N-M`, `N-M/S`, `N/S` and comma lists. All
//! times are UTC. Day-of-month and day-of-week must both match.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

/// How far ahead `next_after` searches before giving up.
const SEARCH_DAYS: u32 = 366 * 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>, // 0=Sun, 6=Sat
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "Expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }

        Ok(CronExpr {
            minutes: Self::parse_field(fields[0], 0, 59)?,
            hours: Self::parse_field(fields[1], 0, 23)?,
            days_of_month: Self::parse_field(fields[2], 1, 31)?,
            months: Self::parse_field(fields[3], 1, 12)?,
            days_of_week: Self::parse_field(fields[4], 0, 6)?,
        })
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        let mut values = Vec::new();

        for part in field.split(',') {
            let part = part.trim();

            if let Some((base, step)) = part.split_once('/') {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("Invalid step: {step}"))?;
                if step == 0 {
                    return Err("Step cannot be zero".into());
                }
                let (start, end) = if base == "*" {
                    (min, max)
                } else if base.contains('-') {
                    Self::parse_range(base, min, max)?
                } else {
                    (Self::parse_value(base, min, max)?, max)
                };
                values.extend((start..=end).step_by(step as usize));
            } else if part.contains('-') {
                let (start, end) = Self::parse_range(part, min, max)?;
                values.extend(start..=end);
            } else if part == "*" {
                values.extend(min..=max);
            } else {
                values.push(Self::parse_value(part, min, max)?);
            }
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err("Field produced no values".into());
        }
        Ok(values)
    }

    fn parse_value(s: &str, min: u32, max: u32) -> Result<u32, String> {
        let v: u32 = s.parse().map_err(|_| format!("Invalid number: {s}"))?;
        if v < min || v > max {
            return Err(format!("{v} out of range {min}-{max}"));
        }
        Ok(v)
    }

    fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid range: {s}"))?;
        let start: u32 = start
            .parse()
            .map_err(|_| format!("Invalid range start: {start}"))?;
        let end: u32 = end
            .parse()
            .map_err(|_| format!("Invalid range end: {end}"))?;
        if start < min || end > max || start > end {
            return Err(format!("Range {start}-{end} invalid for {min}-{max}"));
        }
        Ok((start, end))
    }

    fn day_matches(&self, day: NaiveDate) -> bool {
        self.days_of_month.contains(&day.day())
            && self.months.contains(&day.month())
            && self
                .days_of_week
                .contains(&day.weekday().num_days_from_sunday())
    }

    /// Does `dt` fall inside a matching minute?
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.day_matches(dt.date_naive())
    }

    /// First matching minute strictly after `after`, or `None` if the
    /// expression never fires (e.g. February 31st).
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let mut day = start.date_naive();

        for _ in 0..SEARCH_DAYS {
            if self.day_matches(day) {
                for &hour in &self.hours {
                    for &minute in &self.minutes {
                        let candidate = day.and_hms_opt(hour, minute, 0)?.and_utc();
                        if candidate >= start {
                            return Some(candidate);
                        }
                    }
                }
            }
            day = day.succ_opt()?;
        }
        None
    }
}
