//! Simplified next-run calculation.
//!
//! Deliberately not full cron. Fixed minute and hour values (or `*`) are
//! honored; when today's slot has already passed, the date advances by
//! day-of-week if constrained, else day-of-month if constrained, else one
//! day. Ranges, steps, and lists are unsupported. A slot still ahead today
//! fires today even when a day constraint would exclude it; that quirk is
//! part of the contract and is covered by tests.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression must have 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid cron field `{0}`")]
    Field(String),
}

/// Parsed subset of `minute hour day-of-month month day-of-week`.
/// Day-of-week uses cron numbering: 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSpec {
    pub minute: u32,
    pub hour: u32,
    pub day_of_month: Option<u32>,
    pub day_of_week: Option<u32>,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }
        let minute = fixed(fields[0], 0, 59)?.unwrap_or(0);
        let hour = fixed(fields[1], 0, 23)?.unwrap_or(0);
        let day_of_month = fixed(fields[2], 1, 31)?;
        // month is accepted for cron shape but not honored
        fixed(fields[3], 1, 12)?;
        let day_of_week = fixed(fields[4], 0, 6)?;
        Ok(Self {
            minute,
            hour,
            day_of_month,
            day_of_week,
        })
    }

    /// Next firing strictly after `now`, evaluated in `tz`.
    pub fn next_run(&self, now: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
        let local = now.with_timezone(&tz).naive_local();
        let at = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default();
        let mut candidate = local.date().and_time(at);

        if candidate <= local {
            if let Some(dow) = self.day_of_week {
                candidate += Duration::days(1);
                while candidate.weekday().num_days_from_sunday() != dow {
                    candidate += Duration::days(1);
                }
            } else if let Some(dom) = self.day_of_month {
                candidate += Duration::days(1);
                let mut guard = 0;
                while candidate.day() != dom && guard < 366 {
                    candidate += Duration::days(1);
                    guard += 1;
                }
            } else {
                candidate += Duration::days(1);
            }
        }

        tz.from_local_datetime(&candidate)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::days(1))
    }
}

fn fixed(field: &str, min: u32, max: u32) -> Result<Option<u32>, CronError> {
    if field == "*" {
        return Ok(None);
    }
    match field.parse::<u32>() {
        Ok(value) if (min..=max).contains(&value) => Ok(Some(value)),
        _ => Err(CronError::Field(field.to_string())),
    }
}

/// Parse a schedule timezone as a fixed offset: "UTC" or "+09:00"-style.
/// Anything unparseable falls back to UTC.
pub fn parse_timezone(tz: &str) -> FixedOffset {
    if let Some(offset) = fixed_offset(tz) {
        return offset;
    }
    if !tz.is_empty() && tz != "UTC" {
        warn!(timezone = %tz, "unparseable timezone; using UTC");
    }
    Utc.fix()
}

fn fixed_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, rest) = if let Some(rest) = tz.strip_prefix('+') {
        (1, rest)
    } else {
        (-1, tz.strip_prefix('-')?)
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn parse_accepts_fixed_fields_and_wildcards() {
        let spec = CronSpec::parse("30 9 * * 1").unwrap();
        assert_eq!(spec.minute, 30);
        assert_eq!(spec.hour, 9);
        assert_eq!(spec.day_of_month, None);
        assert_eq!(spec.day_of_week, Some(1));

        assert!(CronSpec::parse("30 9 * *").is_err());
        assert!(CronSpec::parse("61 9 * * *").is_err());
        assert!(CronSpec::parse("*/5 9 * * *").is_err(), "steps are out of scope");
    }

    #[test]
    fn daily_slot_fires_today_if_still_ahead() {
        let spec = CronSpec::parse("30 9 * * *").unwrap();
        let next = spec.next_run(at(2026, 8, 8, 8, 0), Utc.fix());
        assert_eq!(next, at(2026, 8, 8, 9, 30));
    }

    #[test]
    fn daily_slot_rolls_to_tomorrow_once_passed() {
        let spec = CronSpec::parse("30 9 * * *").unwrap();
        let next = spec.next_run(at(2026, 8, 8, 10, 0), Utc.fix());
        assert_eq!(next, at(2026, 8, 9, 9, 30));
    }

    #[test]
    fn day_of_week_advances_to_the_next_matching_weekday() {
        // 2026-08-10 is a Monday
        let spec = CronSpec::parse("0 9 * * 1").unwrap();
        let next = spec.next_run(at(2026, 8, 10, 10, 0), Utc.fix());
        assert_eq!(next, at(2026, 8, 17, 9, 0));
    }

    #[test]
    fn slot_still_ahead_today_wins_over_the_day_constraint() {
        // Monday 08:00, constrained to Wednesday: today's 09:00 still fires.
        // Known simplification, preserved on purpose.
        let spec = CronSpec::parse("0 9 * * 3").unwrap();
        let next = spec.next_run(at(2026, 8, 10, 8, 0), Utc.fix());
        assert_eq!(next, at(2026, 8, 10, 9, 0));
    }

    #[test]
    fn day_of_month_advances_into_next_month() {
        let spec = CronSpec::parse("0 0 1 * *").unwrap();
        let next = spec.next_run(at(2026, 8, 8, 12, 0), Utc.fix());
        assert_eq!(next, at(2026, 9, 1, 0, 0));
    }

    #[test]
    fn timezone_offset_shifts_the_local_slot() {
        let spec = CronSpec::parse("0 9 * * *").unwrap();
        let tz = parse_timezone("+09:00");
        // 01:00 UTC = 10:00 local, past the slot; next is tomorrow 09:00
        // local = today 2026-08-09 00:00 UTC
        let next = spec.next_run(at(2026, 8, 8, 1, 0), tz);
        assert_eq!(next, at(2026, 8, 9, 0, 0));
    }

    #[test]
    fn unparseable_timezone_falls_back_to_utc() {
        assert_eq!(parse_timezone("Asia/Seoul"), Utc.fix());
        assert_eq!(parse_timezone("UTC"), Utc.fix());
        assert_eq!(
            parse_timezone("-05:30"),
            FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap()
        );
    }
}
