//! Recurrence schedules for polled queries
//!
//! A schedule is either a plain interval in seconds or a calendar schedule in
//! the style of cron: each of minutes, hours, days, months and weekdays is
//! `"*"` or a comma-separated list of values and `a-b` ranges, and an
//! optional timezone names the zone the fields are read in.
//!
//! | field      | range |
//! |------------|-------|
//! | `minutes`  | 0-59  |
//! | `hours`    | 0-23  |
//! | `days`     | 1-31  |
//! | `months`   | 1-12  |
//! | `weekdays` | 0-6   |
//!
//! Validation happens locally, before anything is sent to the server.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use triggerware_core::{Error, Result};

const TIMEZONE_PATTERN: &str = r"^[A-Za-z_]+(/[A-Za-z0-9_+\-]+)*$";

static TIMEZONE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(TIMEZONE_PATTERN));

/// When a polled query runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Schedule {
    /// Every n seconds
    Interval(u64),
    Calendar(CalendarSchedule),
}

impl Schedule {
    pub fn every_seconds(seconds: u64) -> Self {
        Schedule::Interval(seconds)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Interval(0) => Err(Error::InvalidSchedule(
                "interval must be at least one second".into(),
            )),
            Schedule::Interval(_) => Ok(()),
            Schedule::Calendar(calendar) => calendar.validate(),
        }
    }
}

impl From<CalendarSchedule> for Schedule {
    fn from(calendar: CalendarSchedule) -> Self {
        Schedule::Calendar(calendar)
    }
}

/// Calendar schedule; unset fields mean "any"
///
/// ```rust
/// use triggerware_session::CalendarSchedule;
///
/// let schedule = CalendarSchedule::new()
///     .minutes("0,30")
///     .hours("9-17")
///     .weekdays("1-5")
///     .timezone("America/New_York");
/// assert!(schedule.validate().is_ok());
///
/// assert!(CalendarSchedule::new().minutes("60").validate().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalendarSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl CalendarSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minutes(mut self, expr: impl Into<String>) -> Self {
        self.minutes = Some(expr.into());
        self
    }

    pub fn hours(mut self, expr: impl Into<String>) -> Self {
        self.hours = Some(expr.into());
        self
    }

    pub fn days(mut self, expr: impl Into<String>) -> Self {
        self.days = Some(expr.into());
        self
    }

    pub fn months(mut self, expr: impl Into<String>) -> Self {
        self.months = Some(expr.into());
        self
    }

    pub fn weekdays(mut self, expr: impl Into<String>) -> Self {
        self.weekdays = Some(expr.into());
        self
    }

    pub fn timezone(mut self, zone: impl Into<String>) -> Self {
        self.timezone = Some(zone.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("minutes", &self.minutes, 0, 59),
            ("hours", &self.hours, 0, 23),
            ("days", &self.days, 1, 31),
            ("months", &self.months, 1, 12),
            ("weekdays", &self.weekdays, 0, 6),
        ];

        for (name, expr, min, max) in fields {
            if let Some(expr) = expr {
                validate_field(name, expr, min, max)?;
            }
        }

        if let Some(zone) = &self.timezone {
            validate_timezone(zone)?;
        }
        Ok(())
    }
}

fn validate_field(name: &str, expr: &str, min: u32, max: u32) -> Result<()> {
    let expr = expr.trim();
    if expr == "*" {
        return Ok(());
    }

    for item in expr.split(',') {
        let item = item.trim();
        match item.split_once('-') {
            Some((low, high)) => {
                let low = parse_value(name, low, min, max)?;
                let high = parse_value(name, high, min, max)?;
                if low > high {
                    return Err(Error::InvalidSchedule(format!(
                        "{}: range {} has its bounds reversed",
                        name, item
                    )));
                }
            }
            None => {
                parse_value(name, item, min, max)?;
            }
        }
    }
    Ok(())
}

fn parse_value(name: &str, text: &str, min: u32, max: u32) -> Result<u32> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidSchedule(format!(
            "{}: {:?} is not a number",
            name, text
        )));
    }
    let value: u32 = text.parse().map_err(|_| {
        Error::InvalidSchedule(format!("{}: {:?} is not a number", name, text))
    })?;

    if value < min || value > max {
        return Err(Error::InvalidSchedule(format!(
            "{}: {} is outside {}-{}",
            name, value, min, max
        )));
    }
    Ok(value)
}

fn validate_timezone(zone: &str) -> Result<()> {
    let pattern = TIMEZONE
        .as_ref()
        .map_err(|e| Error::internal(format!("timezone pattern: {}", e)))?;

    if pattern.is_match(zone) {
        Ok(())
    } else {
        Err(Error::InvalidSchedule(format!(
            "timezone {:?} is not a zone name",
            zone
        )))
    }
}
