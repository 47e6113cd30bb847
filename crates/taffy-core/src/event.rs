//! Calendar event resources.
//!
//! [`EventResource`] is the body sent to the Calendar API when inserting an
//! event; [`EventResult`] is what the API returns. Both ends of a resource
//! are always the same kind of [`EventDateTime`]: either both all-day or
//! both timed.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Start or end of an event, in the Calendar API's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDateTime {
    /// An all-day boundary: `{"date": "YYYY-MM-DD"}`.
    AllDay { date: NaiveDate },
    /// A timed boundary: `{"dateTime": "<RFC 3339>", "timeZone": "<IANA>"}`.
    Timed {
        #[serde(rename = "dateTime")]
        date_time: String,
        #[serde(rename = "timeZone")]
        time_zone: String,
    },
}

impl EventDateTime {
    /// Creates an all-day boundary.
    pub fn all_day(date: NaiveDate) -> Self {
        Self::AllDay { date }
    }

    /// Creates a timed boundary from a zoned datetime.
    ///
    /// The instant keeps the zone's offset (`2024-03-16T15:00:00-04:00`) and
    /// the zone's IANA name goes into `timeZone`.
    pub fn timed<Tz>(at: &DateTime<Tz>, time_zone: impl Into<String>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self::Timed {
            date_time: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            time_zone: time_zone.into(),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay { .. })
    }

    /// Returns the date of an all-day boundary.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::AllDay { date } => Some(*date),
            Self::Timed { .. } => None,
        }
    }

    /// Returns the RFC 3339 instant of a timed boundary.
    pub fn date_time(&self) -> Option<&str> {
        match self {
            Self::Timed { date_time, .. } => Some(date_time),
            Self::AllDay { .. } => None,
        }
    }

    /// Returns the IANA zone name of a timed boundary.
    pub fn time_zone(&self) -> Option<&str> {
        match self {
            Self::Timed { time_zone, .. } => Some(time_zone),
            Self::AllDay { .. } => None,
        }
    }
}

/// Rejected event resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventResourceError {
    #[error("event start and end must both be all-day or both be timed")]
    MixedBoundaries,
}

/// An event to insert into a calendar.
///
/// Deserializing goes through [`EventResource::new`], so a mixed pair of
/// boundaries is rejected there too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedEventResource")]
pub struct EventResource {
    pub summary: String,
    pub description: String,
    start: EventDateTime,
    end: EventDateTime,
}

#[derive(Deserialize)]
struct UncheckedEventResource {
    summary: String,
    description: String,
    start: EventDateTime,
    end: EventDateTime,
}

impl TryFrom<UncheckedEventResource> for EventResource {
    type Error = EventResourceError;

    fn try_from(raw: UncheckedEventResource) -> Result<Self, Self::Error> {
        Self::new(raw.summary, raw.description, raw.start, raw.end)
    }
}

impl EventResource {
    /// Creates a resource, rejecting mixed all-day/timed boundaries.
    pub fn new(
        summary: impl Into<String>,
        description: impl Into<String>,
        start: EventDateTime,
        end: EventDateTime,
    ) -> Result<Self, EventResourceError> {
        if start.is_all_day() != end.is_all_day() {
            return Err(EventResourceError::MixedBoundaries);
        }
        Ok(Self {
            summary: summary.into(),
            description: description.into(),
            start,
            end,
        })
    }

    /// Creates a single-day all-day event (`start.date == end.date`).
    pub fn all_day(
        summary: impl Into<String>,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            start: EventDateTime::all_day(date),
            end: EventDateTime::all_day(date),
        }
    }

    /// Creates a timed event; both ends carry the same zone name.
    pub fn timed<Tz>(
        summary: impl Into<String>,
        description: impl Into<String>,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        time_zone: &str,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            summary: summary.into(),
            description: description.into(),
            start: EventDateTime::timed(start, time_zone),
            end: EventDateTime::timed(end, time_zone),
        }
    }

    pub fn start(&self) -> &EventDateTime {
        &self.start
    }

    pub fn end(&self) -> &EventDateTime {
        &self.end
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }
}

/// An event as returned by the Calendar API after insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    /// Link to the event in the Calendar web UI.
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
