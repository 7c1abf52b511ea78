//! Fixed-grammar resolution of spoken dates and times.
//!
//! Recognized date tokens are `today`, `tomorrow` and `next <weekday>`;
//! recognized times are `at <h> am|pm`, `at <h> o'clock` and
//! `at <h>:<mm> [am|pm]`. Anything else falls back to the current date and
//! 09:00. The first token of each kind wins.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Time of day used when no time phrase is present.
pub const DEFAULT_HOUR: u32 = 9;

static DAY_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(today|tomorrow)\b").expect("valid day regex"));

static NEXT_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bnext (monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("valid weekday regex")
});

static TIME_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bat (\d{1,2})(?::(\d{2}))?(?:\s*(a\.?\s?m|p\.?\s?m|o'?clock)\b|\b)")
        .expect("valid time regex")
});

/// Resolves `text` to a full date and time relative to `now`.
///
/// # Arguments
/// * `text` - The spoken "when" reply, e.g. "next friday at 3:30 pm".
/// * `now` - Reference instant; its date anchors every relative token.
///
/// # Returns
/// The resolved instant. Unrecognized input yields today at 09:00.
///
/// # Details
/// `today`/`tomorrow` take precedence over `next <weekday>`. A time needs
/// the word `at`; an hour alone with no suffix or minutes is ignored, and
/// out-of-range hours or minutes fall back to the default time.
pub fn resolve(text: &str, now: NaiveDateTime) -> NaiveDateTime {
    let text = text.to_lowercase();
    let date = resolve_date(&text, now.date());
    let time = resolve_time(&text).unwrap_or_else(default_time);
    let when = date.and_time(time);
    debug!("event=resolve_datetime input=\"{}\" when={}", text, when);
    when
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn resolve_date(text: &str, today: NaiveDate) -> NaiveDate {
    if let Some(word) = DAY_WORD.captures(text).and_then(|c| c.get(1)) {
        return match word.as_str() {
            "tomorrow" => add_days(today, 1),
            _ => today,
        };
    }
    let weekday = NEXT_WEEKDAY
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<Weekday>().ok());
    match weekday {
        Some(weekday) => next_weekday(today, weekday),
        None => today,
    }
}

/// The next occurrence of `weekday` strictly after `today`.
///
/// # Returns
/// A date one to seven days ahead; naming today's weekday gives a week later.
pub fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let ahead = match (target + 7 - current) % 7 {
        0 => 7,
        days => days,
    };
    add_days(today, i64::from(ahead))
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

fn resolve_time(text: &str) -> Option<NaiveTime> {
    TIME_PHRASE.captures_iter(text).find_map(|caps| time_from(&caps))
}

fn time_from(caps: &Captures<'_>) -> Option<NaiveTime> {
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: Option<u32> = match caps.get(2) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    let suffix = caps
        .get(3)
        .map(|m| m.as_str().chars().filter(char::is_ascii_alphabetic).collect::<String>());

    let hour = match suffix.as_deref() {
        Some("am") | Some("oclock") => from_twelve_hour(hour, false)?,
        Some("pm") => from_twelve_hour(hour, true)?,
        // A bare hour is too ambiguous to act on; `at 14:30` is read as 24-hour.
        _ => {
            minute?;
            hour
        }
    };
    NaiveTime::from_hms_opt(hour, minute.unwrap_or(0), 0)
}

fn from_twelve_hour(hour: u32, pm: bool) -> Option<u32> {
    match (hour, pm) {
        (1..=11, false) => Some(hour),
        (12, false) => Some(0),
        (1..=11, true) => Some(hour + 12),
        (12, true) => Some(12),
        _ => None,
    }
}
