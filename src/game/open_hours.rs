//! Open Hours
//!
//! A game may only accept new actions during weekly schedules, e.g.
//!
//! ```text
//! [{ "daysOfWeek": ["m", "w", "f"], "startTime": "9:00am", "endTime": "5:00pm",
//!    "autoStartOfDay": true, "holidays": ["12/25"] }]
//! ```
//!
//! Schedules with `autoStartOfDay` also make the interactor add a
//! `start_of_day` entry the first time the game is open on each real-world
//! day. All times are local wall-clock times.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::log_book::LogBook;

/// How far ahead to look for the next scheduled opening.
const MAX_DAYS_TO_SEARCH: u64 = 100;

static TIME_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d+)(AM|PM|am|pm)?$").expect("TIME_EXPR pattern is invalid"));

static HOLIDAY_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9]\d*)/([1-9]\d*)$").expect("HOLIDAY_EXPR pattern is invalid"));

/// Open hours errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenHoursError {
    /// Time is not `h:mm` with an optional am/pm suffix.
    #[error("Unable to parse time string {0}")]
    InvalidTime(String),

    /// Unknown day of the week.
    #[error("Invalid day of the week: {0}")]
    InvalidDay(String),

    /// Holiday is not `month/day`.
    #[error("Expected holiday to be in the form month/day (no leading 0s) but got {0}")]
    InvalidHoliday(String),

    /// Schedule closes before it opens.
    #[error("Scheduled end time {end} is before start time {start}")]
    EndBeforeStart {
        /// Opening time.
        start: String,
        /// Closing time.
        end: String,
    },

    /// The latest game day does not begin with a start of day entry.
    #[error("First action of day {day} is type {entry_type} not start_of_day")]
    MissingStartOfDay {
        /// Game day.
        day: u32,
        /// Type of its first entry.
        entry_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    days_of_week: Vec<String>,
    start_time: String,
    end_time: String,
    #[serde(default)]
    auto_start_of_day: bool,
    #[serde(default)]
    holidays: Vec<String>,
}

/// One weekly opening window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct Schedule {
    days_of_week: Vec<Weekday>,
    /// Minutes after midnight.
    start_minutes: u32,
    end_minutes: u32,
    /// Start a new game day when this schedule opens.
    pub auto_start_of_day: bool,
    /// (month, day)
    holidays: Vec<(u32, u32)>,
}

impl Schedule {
    /// Build a schedule from human readable parts.
    pub fn new(
        days_of_week: &[&str],
        start_time: &str,
        end_time: &str,
        auto_start_of_day: bool,
        holidays: &[&str],
    ) -> Result<Self, OpenHoursError> {
        let start_minutes = parse_time(start_time)?;
        let end_minutes = parse_time(end_time)?;

        if start_minutes > end_minutes {
            return Err(OpenHoursError::EndBeforeStart {
                start: format_time(start_minutes),
                end: format_time(end_minutes),
            });
        }

        Ok(Self {
            days_of_week: days_of_week.iter().map(|d| parse_day(d)).collect::<Result<_, _>>()?,
            start_minutes,
            end_minutes,
            auto_start_of_day,
            holidays: holidays.iter().map(|h| parse_holiday(h)).collect::<Result<_, _>>()?,
        })
    }

    /// Opening time, e.g. `9:00am`.
    pub fn start_time(&self) -> String {
        format_time(self.start_minutes)
    }

    /// Closing time, e.g. `5:00pm`.
    pub fn end_time(&self) -> String {
        format_time(self.end_minutes)
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&(date.month(), date.day()))
    }

    /// Whether `now` falls inside this schedule.
    pub fn is_game_open(&self, now: NaiveDateTime) -> bool {
        if self.is_holiday(now.date()) || !self.days_of_week.contains(&now.weekday()) {
            return false;
        }

        let minutes = now.hour() * 60 + now.minute();
        self.start_minutes <= minutes && minutes < self.end_minutes
    }

    /// Next time after `now` this schedule opens.
    pub fn next_open_hours_start(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let opens_at = NaiveTime::from_hms_opt(self.start_minutes / 60, self.start_minutes % 60, 0)?;

        (0..MAX_DAYS_TO_SEARCH)
            .filter_map(|offset| now.date().checked_add_days(Days::new(offset)))
            .map(|date| date.and_time(opens_at))
            .find(|start| {
                *start > now && !self.is_holiday(start.date()) && self.days_of_week.contains(&start.weekday())
            })
    }
}

impl TryFrom<RawSchedule> for Schedule {
    type Error = OpenHoursError;

    fn try_from(raw: RawSchedule) -> Result<Self, Self::Error> {
        let days: Vec<&str> = raw.days_of_week.iter().map(String::as_str).collect();
        let holidays: Vec<&str> = raw.holidays.iter().map(String::as_str).collect();
        Self::new(&days, &raw.start_time, &raw.end_time, raw.auto_start_of_day, &holidays)
    }
}

impl From<Schedule> for RawSchedule {
    fn from(schedule: Schedule) -> Self {
        Self {
            days_of_week: schedule.days_of_week.iter().map(|d| day_name(*d).to_string()).collect(),
            start_time: schedule.start_time(),
            end_time: schedule.end_time(),
            auto_start_of_day: schedule.auto_start_of_day,
            holidays: schedule.holidays.iter().map(|(m, d)| format!("{}/{}", m, d)).collect(),
        }
    }
}

/// Stored either as a bare list or wrapped in `{"schedules": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredOpenHours {
    List(Vec<Schedule>),
    Wrapped { schedules: Vec<Schedule> },
}

impl From<StoredOpenHours> for OpenHours {
    fn from(stored: StoredOpenHours) -> Self {
        match stored {
            StoredOpenHours::List(schedules) | StoredOpenHours::Wrapped { schedules } => Self { schedules },
        }
    }
}

/// Every schedule a game is open under. No schedules means always open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredOpenHours")]
pub struct OpenHours {
    /// Opening windows.
    pub schedules: Vec<Schedule>,
}

impl OpenHours {
    /// Open hours made of `schedules`.
    pub fn new(schedules: Vec<Schedule>) -> Self {
        Self { schedules }
    }

    /// Whether any schedule is open at `now`.
    pub fn is_game_open(&self, now: NaiveDateTime) -> bool {
        self.schedules.is_empty() || self.schedules.iter().any(|s| s.is_game_open(now))
    }

    /// Earliest upcoming opening among schedules that start days
    /// automatically.
    pub fn next_open_hours_start(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.schedules
            .iter()
            .filter(|s| s.auto_start_of_day)
            .filter_map(|s| s.next_open_hours_start(now))
            .min()
    }

    /// Whether any schedule starts days automatically.
    pub fn has_automatic_start_of_day(&self) -> bool {
        self.schedules.iter().any(|s| s.auto_start_of_day)
    }
}

/// Local wall-clock time of a unix timestamp.
pub fn local_time(unix_secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(unix_secs, 0).map(|t| t.with_timezone(&Local).naive_local())
}

/// Whether the latest game day was started on the real-world date `today`.
pub fn game_day_started_on(log_book: &LogBook, today: NaiveDate) -> Result<bool, OpenHoursError> {
    let Some(day) = log_book.max_day() else {
        return Ok(false);
    };
    let Some(first) = log_book.first_entry_of_day(day) else {
        return Ok(false);
    };

    if !first.is_start_of_day() {
        return Err(OpenHoursError::MissingStartOfDay {
            day,
            entry_type: first.entry_type.clone(),
        });
    }

    Ok(first
        .timestamp_secs()
        .and_then(local_time)
        .is_some_and(|started| started.date() == today))
}

fn parse_time(time: &str) -> Result<u32, OpenHoursError> {
    let invalid = || OpenHoursError::InvalidTime(time.to_string());
    let caps = TIME_EXPR.captures(time.trim()).ok_or_else(invalid)?;

    let mut hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = caps[2].parse().map_err(|_| invalid())?;
    if hour == 12 {
        hour = 0;
    }
    if caps.get(3).is_some_and(|m| m.as_str().eq_ignore_ascii_case("pm")) {
        hour += 12;
    }

    if hour >= 24 || minute >= 60 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

fn format_time(minutes: u32) -> String {
    let mut hours = minutes / 60;
    let is_pm = hours >= 12;
    if is_pm {
        hours -= 12;
    }
    if hours == 0 {
        hours = 12;
    }

    format!("{}:{:02}{}", hours, minutes % 60, if is_pm { "pm" } else { "am" })
}

fn parse_day(day: &str) -> Result<Weekday, OpenHoursError> {
    match day.to_lowercase().as_str() {
        "monday" | "m" => Ok(Weekday::Mon),
        "tuesday" | "t" => Ok(Weekday::Tue),
        "wednesday" | "w" => Ok(Weekday::Wed),
        "thursday" | "r" => Ok(Weekday::Thu),
        "friday" | "f" => Ok(Weekday::Fri),
        "saturday" | "s" => Ok(Weekday::Sat),
        "sunday" | "u" => Ok(Weekday::Sun),
        _ => Err(OpenHoursError::InvalidDay(day.to_string())),
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn parse_holiday(holiday: &str) -> Result<(u32, u32), OpenHoursError> {
    let invalid = || OpenHoursError::InvalidHoliday(holiday.to_string());
    let caps = HOLIDAY_EXPR.captures(holiday).ok_or_else(invalid)?;

    let month = caps[1].parse().map_err(|_| invalid())?;
    let day = caps[2].parse().map_err(|_| invalid())?;
    Ok((month, day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_book::SerializedLogBook;
    use chrono::TimeZone;
    use serde_json::json;

    // 2024-03-06 is a Wednesday
    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    fn weekdays_nine_to_five() -> Schedule {
        Schedule::new(&["m", "t", "w", "r", "f"], "9:00am", "5:00pm", true, &["3/8"]).unwrap()
    }

    #[test]
    fn test_parse_and_format_times() {
        assert_eq!(parse_time("9:00am"), Ok(540));
        assert_eq!(parse_time("12:30am"), Ok(30));
        assert_eq!(parse_time("12:15PM"), Ok(735));
        assert_eq!(parse_time("17:45"), Ok(1065));
        assert!(parse_time("noon").is_err());
        assert!(parse_time("9:75am").is_err());

        assert_eq!(format_time(540), "9:00am");
        assert_eq!(format_time(30), "12:30am");
        assert_eq!(format_time(735), "12:15pm");
    }

    #[test]
    fn test_schedule_validation() {
        assert!(matches!(
            Schedule::new(&["m"], "5:00pm", "9:00am", false, &[]),
            Err(OpenHoursError::EndBeforeStart { .. })
        ));
        assert!(matches!(
            Schedule::new(&["someday"], "9:00am", "5:00pm", false, &[]),
            Err(OpenHoursError::InvalidDay(_))
        ));
        assert!(matches!(
            Schedule::new(&["m"], "9:00am", "5:00pm", false, &["03/08"]),
            Err(OpenHoursError::InvalidHoliday(_))
        ));
    }

    #[test]
    fn test_is_game_open() {
        let schedule = weekdays_nine_to_five();

        assert!(schedule.is_game_open(at(6, 9, 0)));
        assert!(schedule.is_game_open(at(6, 16, 59)));
        assert!(!schedule.is_game_open(at(6, 17, 0)));
        assert!(!schedule.is_game_open(at(6, 8, 59)));
        // Friday holiday and Saturday
        assert!(!schedule.is_game_open(at(8, 12, 0)));
        assert!(!schedule.is_game_open(at(9, 12, 0)));
    }

    #[test]
    fn test_next_open_hours_start() {
        let schedule = weekdays_nine_to_five();

        assert_eq!(schedule.next_open_hours_start(at(6, 8, 0)), Some(at(6, 9, 0)));
        assert_eq!(schedule.next_open_hours_start(at(6, 9, 0)), Some(at(7, 9, 0)));
        // Skips the Friday holiday and the weekend
        assert_eq!(schedule.next_open_hours_start(at(7, 12, 0)), Some(at(11, 9, 0)));
    }

    #[test]
    fn test_open_hours_combine_schedules() {
        let always = OpenHours::default();
        assert!(always.is_game_open(at(9, 3, 0)));
        assert!(!always.has_automatic_start_of_day());
        assert_eq!(always.next_open_hours_start(at(9, 3, 0)), None);

        let evenings = Schedule::new(&["s", "u"], "6:00pm", "10:00pm", false, &[]).unwrap();
        let hours = OpenHours::new(vec![weekdays_nine_to_five(), evenings]);
        assert!(hours.is_game_open(at(9, 19, 0)));
        assert!(!hours.is_game_open(at(9, 12, 0)));
        assert!(hours.has_automatic_start_of_day());
        // Only automatic schedules count
        assert_eq!(hours.next_open_hours_start(at(9, 12, 0)), Some(at(11, 9, 0)));
    }

    #[test]
    fn test_stored_forms() {
        let list: OpenHours = serde_json::from_value(json!([
            { "daysOfWeek": ["m", "Wednesday"], "startTime": "9:00am", "endTime": "5:00pm" }
        ]))
        .unwrap();
        let wrapped: OpenHours = serde_json::from_value(json!({
            "class": "open-hours-v1",
            "schedules": [{ "daysOfWeek": ["m", "Wednesday"], "startTime": "9:00am", "endTime": "5:00pm" }]
        }))
        .unwrap();
        assert_eq!(list, wrapped);
        assert!(!list.schedules[0].auto_start_of_day);

        let stored = serde_json::to_value(&list).unwrap();
        assert_eq!(stored["schedules"][0]["daysOfWeek"], json!(["Monday", "Wednesday"]));
        assert_eq!(serde_json::from_value::<OpenHours>(stored).unwrap(), list);

        assert!(serde_json::from_value::<OpenHours>(json!([{ "daysOfWeek": ["m"], "startTime": "late", "endTime": "5:00pm" }])).is_err());
    }

    #[test]
    fn test_game_day_started_on() {
        let started = Local.with_ymd_and_hms(2024, 3, 6, 9, 30, 0).single().unwrap().timestamp();
        let book = LogBook::deserialize(
            SerializedLogBook {
                game_version: "3".into(),
                raw_entries: vec![
                    json!({ "day": 1, "timestamp": started }).as_object().cloned().unwrap(),
                    json!({ "action": "move", "timestamp": started + 60 }).as_object().cloned().unwrap(),
                ],
            },
            None,
        )
        .unwrap();

        assert_eq!(game_day_started_on(&book, at(6, 0, 0).date()), Ok(true));
        assert_eq!(game_day_started_on(&book, at(7, 0, 0).date()), Ok(false));
    }

    #[test]
    fn test_game_day_without_start_of_day() {
        let book = LogBook::deserialize(
            SerializedLogBook {
                game_version: "3".into(),
                raw_entries: vec![json!({ "action": "move", "day": 1 }).as_object().cloned().unwrap()],
            },
            None,
        )
        .unwrap();

        assert!(matches!(
            game_day_started_on(&book, at(6, 0, 0).date()),
            Err(OpenHoursError::MissingStartOfDay { day: 1, .. })
        ));
    }
}
