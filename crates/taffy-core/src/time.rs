//! Best-effort time-of-day extraction from free text.
//!
//! Only the `H[:MM] am|pm` shape is recognised ("3pm", "2:30 PM",
//! "11:05am"). There is no date understanding: callers decide which day the
//! time applies to.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*(am|pm)").expect("valid time regex")
});

/// A wall-clock time in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    /// Converts to a `NaiveTime`, or `None` when out of range (e.g. "25pm").
    pub fn to_naive(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

/// Finds the first `H[:MM] am|pm` in `text` and converts it to 24-hour form.
///
/// 12pm is noon, 12am is midnight, and `X pm` adds twelve hours for X < 12.
/// Values are not range-checked here; see [`TimeOfDay::to_naive`].
pub fn extract_time_of_day(text: &str) -> Option<TimeOfDay> {
    let caps = TIME_PATTERN.captures(text)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let is_pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");

    if is_pm && hour < 12 {
        hour += 12;
    }
    if !is_pm && hour == 12 {
        hour = 0;
    }

    Some(TimeOfDay { hour, minute })
}

/// The calendar day after `now`, in `now`'s own zone.
pub fn next_day<Tz: TimeZone>(now: &DateTime<Tz>) -> NaiveDate {
    let today = now.date_naive();
    today.succ_opt().unwrap_or(today)
}

/// Resolves a local wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are pushed forward by the gap, the way a wall clock would read.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest(),
    }
}
