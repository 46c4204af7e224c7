use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::ScheduleConfig;
use crate::{Error, Result};

/// How often a scheduled job recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Every day at the configured time
    Daily,
    /// Once a week on the given weekday
    Weekly(Weekday),
}

/// A recurring wall-clock trigger anchored to a timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSpec {
    pub recurrence: Recurrence,
    pub time_of_day: NaiveTime,
    pub timezone: Tz,
}

impl ScheduleSpec {
    /// Parse a `[schedule]` section. Any invalid field is a configuration error.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let recurrence = match config.every.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => {
                if let Some(day) = config.day {
                    weekday_from_number(day)?;
                    tracing::warn!(day, "`day` has no effect on a daily schedule, ignoring it");
                }
                Recurrence::Daily
            }
            "week" | "weekly" => {
                let day = config.day.ok_or_else(|| {
                    Error::Config("weekly schedule requires `day` (1-7, Monday = 1)".to_string())
                })?;
                Recurrence::Weekly(weekday_from_number(day)?)
            }
            other => {
                return Err(Error::Config(format!(
                    "unknown schedule frequency '{}', expected 'day' or 'week'",
                    other
                )))
            }
        };

        let time = config.time.trim();
        let time_of_day = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .map_err(|_| Error::Config(format!("invalid schedule time '{}', expected HH:MM", time)))?;

        let timezone: Tz = config
            .timezone
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone '{}'", config.timezone)))?;

        Ok(Self {
            recurrence,
            time_of_day,
            timezone,
        })
    }

    /// The first trigger instant strictly after `after`.
    ///
    /// A time of day that falls into a DST gap fires one hour later in
    /// local terms; an ambiguous one fires on its first occurrence.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = after.with_timezone(&self.timezone).date_naive();

        loop {
            if self.matches(date) {
                let candidate = self.resolve(date);
                if candidate > after {
                    return candidate;
                }
            }
            date = date + Duration::days(1);
        }
    }

    fn matches(&self, date: NaiveDate) -> bool {
        match self.recurrence {
            Recurrence::Daily => true,
            Recurrence::Weekly(weekday) => date.weekday() == weekday,
        }
    }

    fn resolve(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(self.time_of_day);
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc())
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = if self.time_of_day.second() == 0 {
            self.time_of_day.format("%H:%M")
        } else {
            self.time_of_day.format("%H:%M:%S")
        };

        match self.recurrence {
            Recurrence::Daily => write!(f, "daily at {} ({})", time, self.timezone.name()),
            Recurrence::Weekly(day) => {
                write!(f, "weekly on {} at {} ({})", day, time, self.timezone.name())
            }
        }
    }
}

fn weekday_from_number(day: u32) -> Result<Weekday> {
    match day {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(Error::Config(format!(
            "invalid schedule day {}, expected 1-7 (Monday = 1)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(every: &str, day: Option<u32>, time: &str, timezone: &str) -> ScheduleConfig {
        ScheduleConfig {
            every: every.to_string(),
            day,
            time: time.to_string(),
            timezone: timezone.to_string(),
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_weekly_moscow() {
        let spec = ScheduleSpec::from_config(&config("week", Some(3), "09:00", "Europe/Moscow")).unwrap();
        assert_eq!(spec.recurrence, Recurrence::Weekly(Weekday::Wed));

        // 2024-01-01 is a Monday; 09:00 MSK is 06:00 UTC
        let first = spec.next_fire_after(utc("2024-01-01T12:00:00Z"));
        assert_eq!(first, utc("2024-01-03T06:00:00Z"));

        let second = spec.next_fire_after(first);
        assert_eq!(second, utc("2024-01-10T06:00:00Z"));
    }

    #[test]
    fn test_daily_same_day_and_next_day() {
        let spec = ScheduleSpec::from_config(&config("daily", None, "18:30", "UTC")).unwrap();
        assert_eq!(
            spec.next_fire_after(utc("2024-05-10T08:00:00Z")),
            utc("2024-05-10T18:30:00Z")
        );
        assert_eq!(
            spec.next_fire_after(utc("2024-05-10T18:30:00Z")),
            utc("2024-05-11T18:30:00Z")
        );
    }

    #[test]
    fn test_dst_gap_shifts_forward() {
        // 02:30 does not exist in Berlin on 2024-03-31
        let spec = ScheduleSpec::from_config(&config("day", None, "02:30", "Europe/Berlin")).unwrap();
        let gap_day = spec.next_fire_after(utc("2024-03-30T12:00:00Z"));
        assert_eq!(gap_day, utc("2024-03-31T01:30:00Z"));

        // Next day is back on summer time
        assert_eq!(spec.next_fire_after(gap_day), utc("2024-04-01T00:30:00Z"));
    }

    #[test]
    fn test_display() {
        let weekly = ScheduleSpec::from_config(&config("week", Some(3), "09:00", "Europe/Moscow")).unwrap();
        assert_eq!(weekly.to_string(), "weekly on Wed at 09:00 (Europe/Moscow)");

        let daily = ScheduleSpec::from_config(&config("day", None, "07:15:30", "UTC")).unwrap();
        assert_eq!(daily.to_string(), "daily at 07:15:30 (UTC)");
    }

    #[test]
    fn test_daily_ignores_valid_day() {
        let spec = ScheduleSpec::from_config(&config("daily", Some(3), "09:00", "UTC")).unwrap();
        assert_eq!(spec.recurrence, Recurrence::Daily);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            config("week", Some(8), "09:00", "Europe/Moscow"),
            config("week", Some(0), "09:00", "Europe/Moscow"),
            config("day", Some(8), "09:00", "Europe/Moscow"),
            config("week", None, "09:00", "Europe/Moscow"),
            config("hourly", None, "09:00", "Europe/Moscow"),
            config("day", None, "25:00", "Europe/Moscow"),
            config("day", None, "09:00", "Mars/Olympus"),
        ];

        for case in &cases {
            let result = ScheduleSpec::from_config(case);
            assert!(matches!(result, Err(Error::Config(_))), "accepted {:?}", case);
        }
    }
}
