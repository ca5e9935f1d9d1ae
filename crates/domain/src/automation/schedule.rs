//! Schedule — recurrence parameters of an automation.

use std::str::FromStr;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::recurrence;
use crate::time::Timestamp;

/// How often an automation fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Once,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(ScheduleError::UnsupportedFrequency(s.to_string())),
        }
    }
}

/// Frequency plus the calendar fields it needs.
///
/// Only the fields relevant to the frequency are read: `day_of_week` for
/// weekly, `day_of_month` for monthly and yearly, `month_of_year` for yearly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    pub time_of_day: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
}

impl Schedule {
    #[must_use]
    pub fn once(time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Once,
            time_of_day,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn daily(time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Daily,
            time_of_day,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn weekly(time_of_day: NaiveTime, day_of_week: impl Into<String>) -> Self {
        Self {
            frequency: Frequency::Weekly,
            time_of_day,
            day_of_week: Some(day_of_week.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn monthly(time_of_day: NaiveTime, day_of_month: u32) -> Self {
        Self {
            frequency: Frequency::Monthly,
            time_of_day,
            day_of_month: Some(day_of_month),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn yearly(time_of_day: NaiveTime, day_of_month: u32, month_of_year: u32) -> Self {
        Self {
            frequency: Frequency::Yearly,
            time_of_day,
            day_of_month: Some(day_of_month),
            month_of_year: Some(month_of_year),
            ..Self::default()
        }
    }

    /// Next firing instant strictly after `now`, evaluated in `tz`.
    ///
    /// `once` schedules never fire again and yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] when a field the frequency needs is missing
    /// or out of range.
    pub fn next_run(&self, now: Timestamp, tz: Tz) -> Result<Option<Timestamp>, ScheduleError> {
        let at = self.time_of_day;
        let next = match self.frequency {
            Frequency::Once => return Ok(None),
            Frequency::Daily => recurrence::next_daily(now, at, tz),
            Frequency::Weekly => {
                let day = self
                    .day_of_week
                    .as_deref()
                    .ok_or(ScheduleError::MissingField("day_of_week"))?;
                recurrence::next_weekly(now, at, day, tz)?
            }
            Frequency::Monthly => {
                let day = self
                    .day_of_month
                    .ok_or(ScheduleError::MissingField("day_of_month"))?;
                recurrence::next_monthly(now, at, day, tz)?
            }
            Frequency::Yearly => {
                let day = self
                    .day_of_month
                    .ok_or(ScheduleError::MissingField("day_of_month"))?;
                let month = self
                    .month_of_year
                    .ok_or(ScheduleError::MissingField("month_of_year"))?;
                recurrence::next_yearly(now, at, day, month, tz)?
            }
        };
        Ok(Some(next))
    }
}
