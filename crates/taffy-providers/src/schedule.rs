//! Free-text event scheduling.
//!
//! The only understanding applied to the request is a time-of-day match
//! ("3pm", "2:30 PM"). The event always goes on the day after `now`: a
//! one-hour slot when a time was found, an all-day entry otherwise.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use taffy_core::{EventResource, extract_time_of_day, next_day, resolve_local};
use tracing::{debug, info, warn};

use crate::calendar::{CalendarApi, PRIMARY_CALENDAR};
use crate::error::{ProviderError, ProviderErrorCode};

pub const TITLE_PREFIX: &str = "Scheduled by Taffy: ";
pub const ALL_DAY_SUFFIX: &str = " (All Day - Time Unspecified)";

/// Characters of the request kept in the title.
const TITLE_LIMIT: usize = 50;

const EVENT_DURATION_MINUTES: i64 = 60;

/// Builds the event for `details` relative to `now`.
pub fn build_event(details: &str, now: &DateTime<Tz>) -> EventResource {
    let title: String = details.chars().take(TITLE_LIMIT).collect();
    let summary = format!("{}{}", TITLE_PREFIX, title);
    let description = format!(
        "Event scheduled by Taffy Assistant based on request: \"{}\"",
        details
    );

    let day = next_day(now);
    let tz = now.timezone();

    let start = extract_time_of_day(details)
        .and_then(|t| t.to_naive())
        .and_then(|time| resolve_local(&tz, day.and_time(time)));

    match start {
        Some(start) => {
            let end = start.clone() + Duration::minutes(EVENT_DURATION_MINUTES);
            EventResource::timed(summary, description, &start, &end, tz.name())
        }
        None => {
            debug!("no usable time in request; creating all-day event");
            EventResource::all_day(format!("{}{}", summary, ALL_DAY_SUFFIX), description, day)
        }
    }
}

/// A failed insertion, as the user should hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleFailure {
    SessionExpired,
    PermissionDenied(String),
    Other(String),
}

impl ScheduleFailure {
    pub fn classify(err: &ProviderError) -> Self {
        let message = if err.message().is_empty() {
            "Unknown error".to_string()
        } else {
            err.message().to_string()
        };

        let expired = err.status() == Some(401)
            || err.code() == ProviderErrorCode::SessionExpired
            || message.to_lowercase().contains("invalid credential");
        if expired {
            return Self::SessionExpired;
        }

        if err.status() == Some(403) || err.code() == ProviderErrorCode::PermissionDenied {
            return Self::PermissionDenied(message);
        }

        Self::Other(message)
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::SessionExpired => {
                "Your Google Calendar session might have expired. Please try signing in again."
                    .to_string()
            }
            Self::PermissionDenied(message) => format!(
                "Sorry, I don't have permission to add events to this calendar. Please check \
                your Google Calendar sharing settings or ensure you granted the correct \
                permissions. ({})",
                message
            ),
            Self::Other(message) => format!(
                "Sorry, I couldn't schedule that. There was an error: {}",
                message
            ),
        }
    }
}

/// Schedules `details` in the primary calendar and returns the reply text.
///
/// The caller is responsible for checking sign-in first.
pub async fn schedule_event(details: &str, calendar: &dyn CalendarApi, now: DateTime<Tz>) -> String {
    let event = build_event(details, &now);
    debug!(summary = %event.summary, all_day = event.is_all_day(), "scheduling event");

    match calendar.insert_event(PRIMARY_CALENDAR, &event).await {
        Ok(result) => {
            info!(id = %result.id, "event created");
            format!(
                "Okay, I've scheduled \"{}\" in your calendar. View it: {}",
                result.summary.as_deref().unwrap_or(&event.summary),
                result.html_link.as_deref().unwrap_or_default()
            )
        }
        Err(e) => {
            warn!(error = %e, "failed to create event");
            ScheduleFailure::classify(&e).user_message()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::BoxFuture;
    use crate::error::ProviderResult;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Mutex;
    use taffy_core::{EventDateTime, EventResult};

    fn now() -> DateTime<Tz> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 3, 15, 9, 30, 0)
            .unwrap()
    }

    fn tomorrow() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 16).unwrap()
    }

    /// Records the inserted event and replies with a canned outcome.
    struct StubCalendar {
        reply: Mutex<Option<ProviderResult<EventResult>>>,
        inserted: Mutex<Vec<(String, EventResource)>>,
    }

    impl StubCalendar {
        fn new(reply: ProviderResult<EventResult>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                inserted: Mutex::new(Vec::new()),
            }
        }
    }

    impl CalendarApi for StubCalendar {
        fn insert_event<'a>(
            &'a self,
            calendar_id: &'a str,
            event: &'a EventResource,
        ) -> BoxFuture<'a, ProviderResult<EventResult>> {
            self.inserted
                .lock()
                .unwrap()
                .push((calendar_id.to_string(), event.clone()));
            let reply = self.reply.lock().unwrap().take().unwrap();
            Box::pin(async move { reply })
        }

        fn set_token(&self, _token: Option<String>) {}

        fn token(&self) -> Option<String> {
            None
        }
    }

    mod events {
        use super::*;

        #[test]
        fn three_pm_is_a_one_hour_slot_tomorrow() {
            let event = build_event("lunch with Sam at 3pm", &now());

            assert_eq!(event.summary, "Scheduled by Taffy: lunch with Sam at 3pm");
            assert_eq!(
                event.start(),
                &EventDateTime::Timed {
                    date_time: "2024-03-16T15:00:00-04:00".to_string(),
                    time_zone: "America/New_York".to_string(),
                }
            );
            assert_eq!(
                event.end().date_time(),
                Some("2024-03-16T16:00:00-04:00")
            );
            assert_eq!(event.end().time_zone(), Some("America/New_York"));
        }

        #[test]
        fn minutes_and_case_are_honoured() {
            let event = build_event("Call at 2:30 PM", &now());
            assert_eq!(event.start().date_time(), Some("2024-03-16T14:30:00-04:00"));
            assert_eq!(event.end().date_time(), Some("2024-03-16T15:30:00-04:00"));
        }

        #[test]
        fn no_time_is_all_day_tomorrow() {
            let event = build_event("dentist", &now());
            assert!(event.is_all_day());
            assert_eq!(event.start().date(), Some(tomorrow()));
            assert_eq!(event.end().date(), Some(tomorrow()));
            assert_eq!(
                event.summary,
                "Scheduled by Taffy: dentist (All Day - Time Unspecified)"
            );
            assert_eq!(
                event.description,
                "Event scheduled by Taffy Assistant based on request: \"dentist\""
            );
        }

        #[test]
        fn out_of_range_time_falls_back_to_all_day() {
            let event = build_event("party at 25pm", &now());
            assert!(event.is_all_day());
        }

        #[test]
        fn title_keeps_fifty_characters() {
            let details = "a".repeat(80);
            let event = build_event(&details, &now());
            assert_eq!(
                event.summary,
                format!("{}{}{}", TITLE_PREFIX, "a".repeat(50), ALL_DAY_SUFFIX)
            );
            assert!(event.description.contains(&details));
        }

        #[test]
        fn late_evening_request_uses_local_day() {
            let late = chrono_tz::America::Los_Angeles
                .with_ymd_and_hms(2024, 3, 15, 23, 30, 0)
                .unwrap();
            let event = build_event("standup 9am", &late);
            assert_eq!(event.start().date_time(), Some("2024-03-16T09:00:00-07:00"));
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn unauthorized_is_session_expired() {
            let err = ProviderError::from_api_status(401, "Login Required");
            assert_eq!(ScheduleFailure::classify(&err), ScheduleFailure::SessionExpired);
        }

        #[test]
        fn invalid_credentials_text_is_session_expired() {
            let err = ProviderError::schedule_failed("Request had Invalid Credentials.");
            assert_eq!(ScheduleFailure::classify(&err), ScheduleFailure::SessionExpired);
        }

        #[test]
        fn forbidden_embeds_provider_message() {
            let err = ProviderError::from_api_status(403, "Insufficient Permission");
            let failure = ScheduleFailure::classify(&err);
            assert_eq!(
                failure,
                ScheduleFailure::PermissionDenied("Insufficient Permission".to_string())
            );
            assert!(failure.user_message().ends_with("(Insufficient Permission)"));
        }

        #[test]
        fn other_errors_are_generic() {
            let err = ProviderError::from_api_status(500, "Backend Error");
            assert_eq!(
                ScheduleFailure::classify(&err).user_message(),
                "Sorry, I couldn't schedule that. There was an error: Backend Error"
            );

            let err = ProviderError::network("");
            assert_eq!(
                ScheduleFailure::classify(&err),
                ScheduleFailure::Other("Unknown error".to_string())
            );
        }
    }

    #[tokio::test]
    async fn success_reply_has_summary_and_link() {
        let calendar = StubCalendar::new(Ok(EventResult {
            id: "evt".to_string(),
            summary: Some("Scheduled by Taffy: schedule a call at 2:30pm".to_string()),
            html_link: Some("http://x".to_string()),
            status: Some("confirmed".to_string()),
        }));

        let reply = schedule_event("schedule a call at 2:30pm", &calendar, now()).await;

        assert!(reply.contains("Scheduled by Taffy: schedule a call at 2:30pm"));
        assert!(reply.contains("http://x"));
        let inserted = calendar.inserted.lock().unwrap();
        assert_eq!(inserted[0].0, "primary");
        assert!(!inserted[0].1.is_all_day());
    }

    #[tokio::test]
    async fn expired_session_reply() {
        let calendar = StubCalendar::new(Err(ProviderError::from_api_status(401, "Invalid Credentials")));
        let reply = schedule_event("meeting at 10am", &calendar, now()).await;
        assert_eq!(
            reply,
            "Your Google Calendar session might have expired. Please try signing in again."
        );
    }
}
