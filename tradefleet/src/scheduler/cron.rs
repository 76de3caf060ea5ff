use chrono::{DateTime, FixedOffset};
use cron::Schedule;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tradefleet_market::calendar::china_now;

/// A validated 5-field cron expression (minute, hour, day-of-month, month,
/// day-of-week) evaluated in the exchange timezone.
///
/// Supports ranges (`a-b`), lists (`a,b`) and steps (`*/n`). Parsed once;
/// tasks with invalid expressions cannot be saved.
#[derive(Debug, Clone)]
pub struct CronSpec {
    expression: String,
    schedule: Schedule,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,

    #[error("cron expression must have 5 fields (minute hour day month weekday), got {0}")]
    FieldCount(usize),

    #[error("invalid cron expression: {0}")]
    Invalid(String),
}

impl CronSpec {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(CronError::Empty);
        }

        let fields = trimmed.split_whitespace().collect::<Vec<_>>();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        // The underlying parser wants a seconds field (pinned to zero) and
        // numbers weekdays from Sunday=1; normalising POSIX numeric weekdays
        // (0-7, both 0 and 7 being Sunday) to names keeps the standard
        // semantics.
        let with_seconds = format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            normalize_dow(fields[4]),
        );
        let schedule = Schedule::from_str(&with_seconds)
            .map_err(|error| CronError::Invalid(error.to_string()))?;

        Ok(Self {
            expression: fields.join(" "),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`, in the exchange timezone.
    pub fn next_fire(&self, after: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        self.schedule.after(&after).next()
    }

    /// Human-readable English description of the schedule.
    pub fn describe(&self) -> String {
        let fields = self.expression.split_whitespace().collect::<Vec<_>>();
        let (minute, hour, dom, month, dow) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        let mut parts = Vec::new();
        if let Some(month) = describe_month(month) {
            parts.push(month);
        }
        if let Some(dom) = describe_dom(dom) {
            parts.push(dom);
        }
        if let Some(dow) = describe_dow(dow) {
            parts.push(dow);
        }

        let time = describe_time(minute, hour);
        if parts.is_empty() {
            match time.starts_with("every") {
                true => time,
                false => format!("every day {time}"),
            }
        } else {
            format!("{} {time}", parts.join(" "))
        }
    }
}

/// Validation summary exposed through the scheduler API.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CronInfo {
    pub valid: bool,
    pub error: Option<String>,
    pub description: Option<String>,
    pub next_run_time: Option<DateTime<FixedOffset>>,
}

/// Validate an expression, returning its description and next fire time when
/// valid, the parse error otherwise.
pub fn cron_validate(expression: &str) -> CronInfo {
    match CronSpec::parse(expression) {
        Ok(spec) => CronInfo {
            valid: true,
            error: None,
            description: Some(spec.describe()),
            next_run_time: spec.next_fire(china_now()),
        },
        Err(error) => CronInfo {
            valid: false,
            error: Some(error.to_string()),
            description: None,
            next_run_time: None,
        },
    }
}

fn describe_time(minute: &str, hour: &str) -> String {
    if hour == "*" {
        if minute == "*" {
            return "every minute".to_string();
        }
        if let Some(step) = minute.strip_prefix("*/") {
            return format!("every {step} minutes");
        }
        return format!("hourly at minute {minute}");
    }

    if let Some(step) = hour.strip_prefix("*/") {
        let minute = if minute == "*" { "0" } else { minute };
        return format!("every {step} hours at minute {minute}");
    }

    match (hour.parse::<u32>(), minute.parse::<u32>()) {
        (Ok(h), Ok(m)) => format!("at {h:02}:{m:02}"),
        _ => format!("at {hour}:{minute}"),
    }
}

fn describe_dow(dow: &str) -> Option<String> {
    if dow == "*" {
        return None;
    }

    if let Some((start, end)) = dow.split_once('-') {
        return Some(format!(
            "{} to {}",
            weekday(start).unwrap_or_else(|| start.to_string()),
            weekday(end).unwrap_or_else(|| end.to_string()),
        ));
    }
    if dow.contains(',') {
        let names = dow
            .split(',')
            .map(|day| weekday(day).unwrap_or_else(|| day.to_string()))
            .join(", ");
        return Some(names);
    }
    weekday(dow).map(|name| format!("every {name}")).or_else(|| Some(format!("on weekday {dow}")))
}

fn describe_dom(dom: &str) -> Option<String> {
    if dom == "*" {
        return None;
    }
    if let Some(step) = dom.strip_prefix("*/") {
        return Some(format!("every {step} days"));
    }
    Some(format!("on day {dom} of the month"))
}

fn describe_month(month: &str) -> Option<String> {
    if month == "*" {
        return None;
    }
    let names = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    match month.parse::<usize>() {
        Ok(index) if (1..=12).contains(&index) => Some(format!("in {}", names[index - 1])),
        _ => Some(format!("in months {month}")),
    }
}

/// Rewrite POSIX numeric weekday tokens to names, preserving ranges, lists
/// and steps.
fn normalize_dow(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (body, step) = match part.split_once('/') {
                Some((body, step)) => (body, Some(step)),
                None => (part, None),
            };
            let body = match body.split_once('-') {
                Some((start, end)) => format!("{}-{}", dow_token(start), dow_token(end)),
                None => dow_token(body),
            };
            match step {
                Some(step) => format!("{body}/{step}"),
                None => body,
            }
        })
        .join(",")
}

fn dow_token(token: &str) -> String {
    match token {
        "0" | "7" => "SUN".to_string(),
        "1" => "MON".to_string(),
        "2" => "TUE".to_string(),
        "3" => "WED".to_string(),
        "4" => "THU".to_string(),
        "5" => "FRI".to_string(),
        "6" => "SAT".to_string(),
        other => other.to_string(),
    }
}

fn weekday(field: &str) -> Option<String> {
    let name = match field.to_lowercase().as_str() {
        "0" | "7" | "sun" => "Sunday",
        "1" | "mon" => "Monday",
        "2" | "tue" => "Tuesday",
        "3" | "wed" => "Wednesday",
        "4" | "thu" => "Thursday",
        "5" | "fri" => "Friday",
        "6" | "sat" => "Saturday",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tradefleet_market::calendar::china_tz;

    #[test]
    fn test_parse_requires_five_fields() {
        assert!(matches!(CronSpec::parse(""), Err(CronError::Empty)));
        assert!(matches!(
            CronSpec::parse("0 9 * *"),
            Err(CronError::FieldCount(4))
        ));
        assert!(matches!(
            CronSpec::parse("0 9 * * * *"),
            Err(CronError::FieldCount(6))
        ));
        assert!(CronSpec::parse("0 9 * * *").is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            CronSpec::parse("61 9 * * *"),
            Err(CronError::Invalid(_))
        ));
        assert!(matches!(
            CronSpec::parse("not a cron at all x"),
            Err(CronError::Invalid(_))
        ));
    }

    #[test]
    fn test_next_fire() {
        let spec = CronSpec::parse("30 9 * * *").unwrap();
        let base = china_tz().with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
        let next = spec.next_fire(base).unwrap();
        assert_eq!(
            next,
            china_tz().with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
        );

        // After the fire time, rolls to the next day.
        let late = china_tz().with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let next = spec.next_fire(late).unwrap();
        assert_eq!(
            next,
            china_tz().with_ymd_and_hms(2024, 6, 4, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_ranges_lists_steps() {
        let weekdays = CronSpec::parse("30 9 * * 1-5").unwrap();
        // Saturday 2024-06-01 -> Monday 2024-06-03.
        let saturday = china_tz().with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(
            weekdays.next_fire(saturday).unwrap(),
            china_tz().with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
        );

        let every_15 = CronSpec::parse("*/15 * * * *").unwrap();
        let base = china_tz().with_ymd_and_hms(2024, 6, 3, 9, 1, 0).unwrap();
        assert_eq!(
            every_15.next_fire(base).unwrap(),
            china_tz().with_ymd_and_hms(2024, 6, 3, 9, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            CronSpec::parse("0 9 * * *").unwrap().describe(),
            "every day at 09:00"
        );
        assert_eq!(
            CronSpec::parse("30 9 * * 1-5").unwrap().describe(),
            "Monday to Friday at 09:30"
        );
        assert_eq!(
            CronSpec::parse("*/15 * * * *").unwrap().describe(),
            "every 15 minutes"
        );
        assert_eq!(
            CronSpec::parse("0 */2 * * *").unwrap().describe(),
            "every 2 hours at minute 0"
        );
    }

    #[test]
    fn test_cron_validate() {
        let info = cron_validate("0 9 * * *");
        assert!(info.valid);
        assert!(info.description.is_some());
        assert!(info.next_run_time.is_some());

        let info = cron_validate("bogus");
        assert!(!info.valid);
        assert!(info.error.is_some());
        assert!(info.next_run_time.is_none());
    }
}
