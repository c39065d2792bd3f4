//! Calendar recurrence: computing the delay from "now" to the next wall-clock
//! occurrence of a daily, weekly, monthly, or yearly target.
//!
//! The computation is a pure function of the supplied `now`, so every edge
//! case is testable without a clock. Field validation happens in the smart
//! constructors; a constructed spec always produces a strictly positive delay.

use std::time::Duration;

use chrono::{Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::core::error::SchedulerError;

/// A calendar recurrence target.
///
/// Constructed only through the validating constructors, so the delay
/// computation never observes an out-of-range field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronSpec {
    /// Every day at the given time.
    Daily {
        /// Target time of day.
        time: NaiveTime,
    },
    /// Every week on the given weekday at the given time.
    Weekly {
        /// Target weekday.
        weekday: Weekday,
        /// Target time of day.
        time: NaiveTime,
    },
    /// Every month on the given day at the given time. Months without the
    /// day (e.g. Feb 30) are skipped.
    Monthly {
        /// Target day of month (1-31).
        day_of_month: u32,
        /// Target time of day.
        time: NaiveTime,
    },
    /// Every year on the given month and day at the given time. Feb 29
    /// matches only in leap years.
    Yearly {
        /// Target month (1-12).
        month: u32,
        /// Target day of month.
        day_of_month: u32,
        /// Target time of day.
        time: NaiveTime,
    },
}

fn clock_time(hour: u32, minute: u32, second: u32) -> Result<NaiveTime, SchedulerError> {
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
        SchedulerError::InvalidCron(format!(
            "time {hour:02}:{minute:02}:{second:02} out of range"
        ))
    })
}

impl CronSpec {
    /// Daily recurrence at `hour:minute:second`.
    pub fn daily(hour: u32, minute: u32, second: u32) -> Result<Self, SchedulerError> {
        Ok(Self::Daily {
            time: clock_time(hour, minute, second)?,
        })
    }

    /// Weekly recurrence; `weekday` is 1-7 for Monday through Sunday.
    pub fn weekly(
        weekday: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self, SchedulerError> {
        let weekday = match weekday {
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            6 => Weekday::Sat,
            7 => Weekday::Sun,
            other => {
                return Err(SchedulerError::InvalidCron(format!(
                    "weekday {other} outside 1-7"
                )))
            }
        };
        Ok(Self::Weekly {
            weekday,
            time: clock_time(hour, minute, second)?,
        })
    }

    /// Monthly recurrence on `day_of_month` (1-31).
    pub fn monthly(
        day_of_month: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self, SchedulerError> {
        if !(1..=31).contains(&day_of_month) {
            return Err(SchedulerError::InvalidCron(format!(
                "day of month {day_of_month} outside 1-31"
            )));
        }
        Ok(Self::Monthly {
            day_of_month,
            time: clock_time(hour, minute, second)?,
        })
    }

    /// Yearly recurrence on `month`/`day_of_month`. The pair must name a date
    /// that exists in at least some year (Feb 29 is allowed, Feb 30 is not).
    pub fn yearly(
        month: u32,
        day_of_month: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self, SchedulerError> {
        // 2000 is a leap year, so every representable month/day pair exists.
        if NaiveDate::from_ymd_opt(2000, month, day_of_month).is_none() {
            return Err(SchedulerError::InvalidCron(format!(
                "no such date: month {month}, day {day_of_month}"
            )));
        }
        Ok(Self::Yearly {
            month,
            day_of_month,
            time: clock_time(hour, minute, second)?,
        })
    }

    /// Delay from the current local time to the next occurrence.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        self.next_delay_from(Local::now().naive_local())
    }

    /// Delay from `now` to the next occurrence strictly after `now`.
    #[must_use]
    pub fn next_delay_from(&self, now: NaiveDateTime) -> Duration {
        let next = match *self {
            CronSpec::Daily { time } => {
                let mut next = now.date().and_time(time);
                if next <= now {
                    next = next + TimeDelta::days(1);
                }
                next
            }
            CronSpec::Weekly { weekday, time } => {
                let mut date = now.date();
                while date.weekday() != weekday {
                    date = date + Days::new(1);
                }
                let mut next = date.and_time(time);
                if next <= now {
                    // Advance by exactly one week, not any other unit.
                    next = next + TimeDelta::days(7);
                }
                next
            }
            CronSpec::Monthly { day_of_month, time } => {
                let mut year = now.year();
                let mut month = now.month();
                let mut found = None;
                // A valid day-of-month recurs within any 48-month window.
                for _ in 0..48 {
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day_of_month) {
                        let candidate = date.and_time(time);
                        if candidate > now {
                            found = Some(candidate);
                            break;
                        }
                    }
                    month += 1;
                    if month > 12 {
                        month = 1;
                        year += 1;
                    }
                }
                found.unwrap_or_else(|| now + TimeDelta::days(1))
            }
            CronSpec::Yearly {
                month,
                day_of_month,
                time,
            } => {
                let mut found = None;
                // Leap years are at most eight years apart.
                for offset in 0..9 {
                    if let Some(date) =
                        NaiveDate::from_ymd_opt(now.year() + offset, month, day_of_month)
                    {
                        let candidate = date.and_time(time);
                        if candidate > now {
                            found = Some(candidate);
                            break;
                        }
                    }
                }
                found.unwrap_or_else(|| now + TimeDelta::days(1))
            }
        };
        (next - now).to_std().unwrap_or_default()
    }
}
