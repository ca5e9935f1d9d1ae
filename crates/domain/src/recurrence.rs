//! Recurrence — next-run computation for calendar schedules.
//!
//! All functions are pure: given `now` and the schedule parameters they
//! return the first matching instant strictly after `now`. Dates are built
//! in the configured time zone so daylight-saving transitions are honoured:
//!
//! - a wall-clock time that falls in a DST gap is shifted forward by the
//!   size of the gap (the UTC offset in effect before the transition is used),
//! - a wall-clock time that occurs twice resolves to the earlier instant.

use chrono::{Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::ScheduleError;
use crate::time::Timestamp;

/// How many months a monthly search may scan before giving up.
pub const MONTHLY_SEARCH_MONTHS: u32 = 24;

/// How many years a yearly search may scan (covers the longest leap-year gap).
pub const YEARLY_SEARCH_YEARS: i32 = 8;

/// Next occurrence of `at` on any day.
#[must_use]
pub fn next_daily(now: Timestamp, at: NaiveTime, tz: Tz) -> Timestamp {
    let today = now.with_timezone(&tz).date_naive();
    let candidate = resolve_local(tz, today.and_time(at));
    if candidate > now {
        return candidate;
    }
    resolve_local(tz, (today + Days::new(1)).and_time(at))
}

/// Next occurrence of `at` on the given weekday.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidDayOfWeek`] when `day_of_week` is not a
/// recognised weekday name.
pub fn next_weekly(
    now: Timestamp,
    at: NaiveTime,
    day_of_week: &str,
    tz: Tz,
) -> Result<Timestamp, ScheduleError> {
    let target = parse_weekday(day_of_week)?;
    let today = now.with_timezone(&tz).date_naive();

    let days_diff = (7 + target.num_days_from_sunday() - today.weekday().num_days_from_sunday()) % 7;
    let date = today + Days::new(u64::from(days_diff));
    let candidate = resolve_local(tz, date.and_time(at));

    if days_diff == 0 && candidate <= now {
        return Ok(resolve_local(tz, (date + Days::new(7)).and_time(at)));
    }
    Ok(candidate)
}

/// Next occurrence of `at` on `day_of_month`.
///
/// Months that do not have `day_of_month` are skipped entirely; the date is
/// never clamped to the end of the month.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidDayOfMonth`] when `day_of_month` is outside
/// `1..=31`, or [`ScheduleError::NoOccurrence`] when nothing matches within
/// [`MONTHLY_SEARCH_MONTHS`].
pub fn next_monthly(
    now: Timestamp,
    at: NaiveTime,
    day_of_month: u32,
    tz: Tz,
) -> Result<Timestamp, ScheduleError> {
    if !(1..=31).contains(&day_of_month) {
        return Err(ScheduleError::InvalidDayOfMonth(day_of_month));
    }

    let local = now.with_timezone(&tz);
    let (mut year, mut month) = (local.year(), local.month());

    for _ in 0..MONTHLY_SEARCH_MONTHS {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day_of_month) {
            let candidate = resolve_local(tz, date.and_time(at));
            if candidate > now {
                return Ok(candidate);
            }
        }

        if month == 12 {
            month = 1;
            year += 1;
        } else {
            month += 1;
        }
    }

    Err(ScheduleError::NoOccurrence("monthly"))
}

/// Next occurrence of `at` on `day_of_month` of `month_of_year`.
///
/// Years that lack the date (29 February) are skipped.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidMonthOfYear`] when `month_of_year` is
/// outside `1..=12`, [`ScheduleError::InvalidDayOfMonth`] when the day can
/// never occur in that month, or [`ScheduleError::NoOccurrence`] when nothing
/// matches within [`YEARLY_SEARCH_YEARS`].
pub fn next_yearly(
    now: Timestamp,
    at: NaiveTime,
    day_of_month: u32,
    month_of_year: u32,
    tz: Tz,
) -> Result<Timestamp, ScheduleError> {
    if !(1..=12).contains(&month_of_year) {
        return Err(ScheduleError::InvalidMonthOfYear(month_of_year));
    }
    // 2000 is a leap year, so this only rejects dates that never exist.
    if NaiveDate::from_ymd_opt(2000, month_of_year, day_of_month).is_none() {
        return Err(ScheduleError::InvalidDayOfMonth(day_of_month));
    }

    let current_year = now.with_timezone(&tz).year();
    for year in current_year..current_year + YEARLY_SEARCH_YEARS {
        let Some(date) = NaiveDate::from_ymd_opt(year, month_of_year, day_of_month) else {
            continue;
        };
        let candidate = resolve_local(tz, date.and_time(at));
        if candidate > now {
            return Ok(candidate);
        }
    }

    Err(ScheduleError::NoOccurrence("yearly"))
}

/// Parse a weekday name (`"mon"`, `"Monday"`, …) case-insensitively.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidDayOfWeek`] for anything else.
pub fn parse_weekday(name: &str) -> Result<Weekday, ScheduleError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sun" | "sunday" => Ok(Weekday::Sun),
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        _ => Err(ScheduleError::InvalidDayOfWeek(name.to_string())),
    }
}

/// Map a wall-clock time in `tz` to a UTC instant.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Timestamp {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - TimeDelta::days(1)))
                .fix();
            let utc = naive - TimeDelta::seconds(i64::from(before.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}
