//! Scheduler configuration and trigger-time arithmetic.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::time::Duration as StdDuration;

use super::error::PaperError;
use crate::ports::config_port::ConfigPort;

const SECTION: &str = "scheduler";

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub trigger_hour: u32,
    pub trigger_minute: u32,
    pub timezone: Tz,
    pub lookback_bars: usize,
    pub workers: usize,
    pub port_timeout: StdDuration,
    pub weekdays_only: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            trigger_hour: 14,
            trigger_minute: 55,
            timezone: chrono_tz::Asia::Shanghai,
            lookback_bars: 100,
            workers: 4,
            port_timeout: StdDuration::from_secs(30),
            weekdays_only: true,
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> PaperError {
    PaperError::ConfigInvalid {
        section: SECTION.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn bounded(config: &dyn ConfigPort, key: &str, default: i64, min: i64, max: i64) -> Result<i64, PaperError> {
    let value = config.get_int(SECTION, key, default);
    if value < min || value > max {
        return Err(invalid(key, format!("{key} must be between {min} and {max}")));
    }
    Ok(value)
}

impl SchedulerConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PaperError> {
        let defaults = SchedulerConfig::default();

        let timezone = match config.get_string(SECTION, "timezone") {
            None => defaults.timezone,
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| invalid("timezone", format!("unknown timezone {name:?}")))?,
        };

        Ok(SchedulerConfig {
            trigger_hour: bounded(config, "trigger_hour", 14, 0, 23)? as u32,
            trigger_minute: bounded(config, "trigger_minute", 55, 0, 59)? as u32,
            timezone,
            lookback_bars: bounded(config, "lookback_bars", 100, 2, 10_000)? as usize,
            workers: bounded(config, "workers", 4, 1, 256)? as usize,
            port_timeout: StdDuration::from_secs(
                bounded(config, "port_timeout_secs", 30, 1, 3_600)? as u64,
            ),
            weekdays_only: config.get_bool(SECTION, "weekdays_only", defaults.weekdays_only),
        })
    }

    /// Calendar date of `now` in the configured timezone.
    pub fn trading_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.weekdays_only || !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// First trigger instant strictly after `now`.
    pub fn next_trigger(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = self.trading_date(now);
        loop {
            if self.is_trading_day(date) {
                if let Some(at) = self.trigger_on(date) {
                    if at > now {
                        return at;
                    }
                }
            }
            date += Duration::days(1);
        }
    }

    /// Trigger instant on `date`. A time that falls in a DST gap moves to the
    /// first valid instant an hour later.
    fn trigger_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(self.trigger_hour, self.trigger_minute, 0)?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .map(|local| local.with_timezone(&Utc))
    }
}
