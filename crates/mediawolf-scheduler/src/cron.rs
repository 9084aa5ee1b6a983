//! Cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Per field: *, N, N-M, */S, N-M/S, N/S and comma lists of those.
//! Months accept JAN-DEC, weekdays accept SUN-SAT (0 and 7 are both Sunday).
//! Example: "30 4 * * MON-FRI" = weekdays at 04:30
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either field matches (classic cron behaviour).

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,

    #[error("invalid cron expression '{expression}': need 5 fields (MIN HOUR DOM MON DOW), got {count}")]
    FieldCount { expression: String, count: usize },

    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Symbolic names, the first one standing for `min`.
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"],
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

/// How many years ahead to look before giving up (Feb 29 can be 8 years away).
const SEARCH_YEARS: i32 = 9;

/// A parsed cron expression. Each field is a bitmask of allowed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a 5-field cron expression.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.is_empty() {
            return Err(CronError::Empty);
        }
        if parts.len() != 5 {
            return Err(CronError::FieldCount {
                expression: expression.to_string(),
                count: parts.len(),
            });
        }

        let mut days_of_week = parse_field(parts[4], &DAY_OF_WEEK)?;
        // 7 is an alias for Sunday.
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: parts.join(" "),
            minutes: parse_field(parts[0], &MINUTE)?,
            hours: parse_field(parts[1], &HOUR)?,
            days_of_month: parse_field(parts[2], &DAY_OF_MONTH)?,
            months: parse_field(parts[3], &MONTH)?,
            days_of_week,
            dom_restricted: !parts[2].starts_with('*'),
            dow_restricted: !parts[4].starts_with('*'),
        })
    }

    /// The normalized expression (fields separated by single spaces).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Compute the first matching minute strictly after `after`, in `after`'s timezone.
    ///
    /// Local times skipped by a DST jump never fire; a repeated local time fires once,
    /// at its earliest instant.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.naive_local();
        let mut candidate = start.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let last_year = start.year() + SEARCH_YEARS;

        while candidate.year() <= last_year {
            if !bit(self.months, candidate.month()) {
                candidate = first_of_next_month(candidate.date())?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = start_of_day(candidate.date().succ_opt()?)?;
                continue;
            }
            if !bit(self.hours, candidate.hour()) {
                candidate = next_hour(candidate)?;
                continue;
            }
            if !bit(self.minutes, candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) if dt > *after => return Some(dt),
                LocalResult::Ambiguous(earliest, _) if earliest > *after => return Some(earliest),
                _ => candidate += Duration::minutes(1),
            }
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl std::str::FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

fn start_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    start_of_day(next?)
}

fn next_hour(t: NaiveDateTime) -> Option<NaiveDateTime> {
    if t.hour() == 23 {
        start_of_day(t.date().succ_opt()?)
    } else {
        t.date().and_hms_opt(t.hour() + 1, 0, 0)
    }
}

/// Parse a cron field into a bitmask of matching values.
fn parse_field(field: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: spec.name,
        value: field.to_string(),
        reason,
    };

    let mut mask = 0u64;
    for item in field.split(',') {
        if item.is_empty() {
            return Err(invalid("empty list item".into()));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let n: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("bad step '{step}'")))?;
                if n == 0 {
                    return Err(invalid("step must be at least 1".into()));
                }
                (range, Some(n))
            }
            None => (item, None),
        };

        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let lo = parse_value(a, spec).map_err(&invalid)?;
            let hi = parse_value(b, spec).map_err(&invalid)?;
            if lo > hi {
                return Err(invalid(format!("range {lo}-{hi} is reversed")));
            }
            (lo, hi)
        } else {
            let n = parse_value(range, spec).map_err(&invalid)?;
            // "N/S" means "from N to the end of the range, every S".
            (n, if step.is_some() { spec.max } else { n })
        };

        for value in (lo..=hi).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << value;
        }
    }
    Ok(mask)
}

fn parse_value(raw: &str, spec: &FieldSpec) -> Result<u32, String> {
    let value = match raw.parse::<u32>() {
        Ok(n) => n,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(raw))
            .map(|i| spec.min + i as u32)
            .ok_or_else(|| format!("'{raw}' is not a number"))?,
    };
    if value < spec.min || value > spec.max {
        return Err(format!("{value} is outside {}-{}", spec.min, spec.max));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Utc, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        CronSchedule::parse(expr).unwrap().next_after(&after).unwrap()
    }

    #[test]
    fn test_every_hour() {
        let next = next("0 * * * *", at(2026, 2, 22, 10, 30));
        assert_eq!(next, at(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_specific_time() {
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 7, 0)), at(2026, 2, 22, 8, 0));
        // Already past today's slot: tomorrow.
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 8, 0)), at(2026, 2, 23, 8, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        assert_eq!(next("*/15 * * * *", at(2026, 2, 22, 10, 2)), at(2026, 2, 22, 10, 15));
        assert_eq!(next("*/15 * * * *", at(2026, 2, 22, 10, 45)), at(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_seconds_are_ignored() {
        let after = Utc.with_ymd_and_hms(2026, 6, 1, 4, 29, 59).unwrap();
        assert_eq!(next("30 4 * * *", after), at(2026, 6, 1, 4, 30));
    }

    #[test]
    fn test_ranges_lists_and_steps() {
        let sched = CronSchedule::parse("5,35 9-17/4 * * *").unwrap();
        let mut t = at(2026, 6, 1, 0, 0);
        let mut fires = Vec::new();
        for _ in 0..6 {
            t = sched.next_after(&t).unwrap();
            fires.push((t.hour(), t.minute()));
        }
        assert_eq!(fires, vec![(9, 5), (9, 35), (13, 5), (13, 35), (17, 5), (17, 35)]);
    }

    #[test]
    fn test_start_with_step() {
        // 50/5 = 50,55
        assert_eq!(next("50/5 * * * *", at(2026, 6, 1, 3, 51)), at(2026, 6, 1, 3, 55));
        assert_eq!(next("50/5 * * * *", at(2026, 6, 1, 3, 56)), at(2026, 6, 1, 4, 50));
    }

    #[test]
    fn test_month_and_weekday_names() {
        // 2026-06-01 is a Monday.
        let t = next("0 12 * JUN sat", at(2026, 6, 1, 0, 0));
        assert_eq!(t, at(2026, 6, 6, 12, 0));
        assert_eq!(t.weekday(), Weekday::Sat);

        let t = next("0 0 1 jan-mar *", at(2026, 6, 1, 0, 0));
        assert_eq!(t, at(2027, 1, 1, 0, 0));
    }

    #[test]
    fn test_sunday_as_seven() {
        let t = next("0 0 * * 7", at(2026, 6, 1, 0, 0));
        assert_eq!(t, at(2026, 6, 7, 0, 0));
        assert_eq!(t.weekday(), Weekday::Sun);
    }

    #[test]
    fn test_dom_or_dow_when_both_restricted() {
        // The 15th, or any Friday. 2026-06-05 is a Friday.
        let sched = CronSchedule::parse("0 0 15 * FRI").unwrap();
        assert_eq!(sched.next_after(&at(2026, 6, 1, 0, 0)).unwrap(), at(2026, 6, 5, 0, 0));
        assert_eq!(sched.next_after(&at(2026, 6, 13, 0, 0)).unwrap(), at(2026, 6, 15, 0, 0));
    }

    #[test]
    fn test_dom_and_dow_when_one_is_star() {
        // Only Mondays; the star day-of-month does not widen the match.
        let t = next("0 0 * * 1", at(2026, 6, 2, 0, 0));
        assert_eq!(t, at(2026, 6, 8, 0, 0));
    }

    #[test]
    fn test_leap_day() {
        assert_eq!(next("0 0 29 2 *", at(2026, 3, 1, 0, 0)), at(2028, 2, 29, 0, 0));
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let sched = CronSchedule::parse("0 0 31 2 *").unwrap();
        assert!(sched.next_after(&at(2026, 1, 1, 0, 0)).is_none());
    }

    #[test]
    fn test_year_rollover() {
        assert_eq!(next("59 23 31 12 *", at(2026, 12, 31, 23, 59)), at(2027, 12, 31, 23, 59));
    }

    #[test]
    fn test_normalized_expression() {
        let sched: CronSchedule = "  30   4 * *  * ".parse().unwrap();
        assert_eq!(sched.expression(), "30 4 * * *");
        assert_eq!(sched.to_string(), "30 4 * * *");
    }

    #[test]
    fn test_invalid_expression() {
        assert_eq!(CronSchedule::parse(""), Err(CronError::Empty));
        assert!(matches!(
            CronSchedule::parse("bad"),
            Err(CronError::FieldCount { count: 1, .. })
        ));
        assert!(matches!(
            CronSchedule::parse("0 0 * * * *"),
            Err(CronError::FieldCount { count: 6, .. })
        ));
    }

    #[test]
    fn test_invalid_fields() {
        for expr in [
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "1,,2 * * * *",
            "a * * * *",
            "* * * FOO *",
        ] {
            let err = CronSchedule::parse(expr).unwrap_err();
            assert!(matches!(err, CronError::InvalidField { .. }), "{expr}: {err}");
        }
    }

    #[test]
    fn test_error_names_the_field() {
        let err = CronSchedule::parse("0 25 * * *").unwrap_err();
        assert_eq!(err.to_string(), "invalid hour field '25': 25 is outside 0-23");
    }
}
