//! The conversation: greeting, surfaced errors, replies and scheduling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use taffy_core::{ChatMessage, Sender, Transcript};
use taffy_providers::google::{SessionSnapshot, SessionStore, StoredToken};
use taffy_providers::{CalendarApi, schedule_event};
use tracing::{debug, warn};

use crate::gemini::ReplyGenerator;

pub const GREETING: &str = "Hello! I'm Taffy, your scheduling assistant. How can I help?";
pub const LOADING_NOTE: &str = "\n(Loading Google services...)";
pub const CONNECT_NOTE: &str = "\n(Connect to Google Calendar below.)";
pub const SIGN_IN_FIRST: &str = "(Please sign in with Google first.)";
pub const CALENDAR_NOT_READY: &str = "(Google Calendar service not ready.)";
pub const EMPTY_REPLY: &str = "Sorry, I couldn't generate a response.";

const SCHEDULING_KEYWORDS: [&str; 5] = ["schedule", "book", "add event", "meeting at", "appointment"];

/// True if the input reads like a request to put something on the calendar.
pub fn wants_to_schedule(input: &str) -> bool {
    let lowered = input.to_lowercase();
    SCHEDULING_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// What the conversation needs to know about the Google session.
#[derive(Clone, Default)]
pub struct SessionView {
    pub is_loading: bool,
    pub is_signed_in: bool,
    /// Load error, shown once as a system notice.
    pub error: Option<String>,
    pub calendar: Option<Arc<dyn CalendarApi>>,
}

impl SessionView {
    /// Combines the manager's snapshot with the token left by a redirect
    /// grant.
    ///
    /// An unexpired stored token counts as signed in; it is handed to the
    /// calendar capability unless that already holds one.
    pub fn observe(
        snapshot: &SessionSnapshot,
        calendar: Option<Arc<dyn CalendarApi>>,
        stored: Option<&StoredToken>,
        now_ms: i64,
    ) -> Self {
        let stored = stored.filter(|token| !token.is_expired(now_ms));
        if let (Some(token), Some(calendar)) = (stored, calendar.as_ref()) {
            if calendar.token().is_none() {
                debug!("adopting stored redirect token");
                calendar.set_token(Some(token.access_token.clone()));
            }
        }

        Self {
            is_loading: snapshot.is_loading(),
            is_signed_in: snapshot.is_signed_in || stored.is_some(),
            error: snapshot.load.error.clone(),
            calendar,
        }
    }
}

/// Transcript owner and reply router.
pub struct Assistant {
    transcript: Transcript,
    generator: Arc<dyn ReplyGenerator>,
    timezone: Tz,
}

impl Assistant {
    pub fn new(generator: Arc<dyn ReplyGenerator>, timezone: Tz) -> Self {
        Self {
            transcript: Transcript::new(),
            generator,
            timezone,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Adds the notices the current session state calls for and returns
    /// how many messages were appended.
    ///
    /// A redirect error is taken from the store only while no system notice
    /// is on screen. The greeting opens an empty transcript when there is no
    /// such error. A load error is shown once.
    pub fn refresh(&mut self, view: &SessionView, store: &SessionStore) -> usize {
        let before = self.transcript.len();

        let has_system = self.transcript.any_from(Sender::System, |_| true);
        let oauth_error = if has_system {
            None
        } else {
            store.take_error().unwrap_or_else(|e| {
                warn!(error = %e, "could not read redirect error");
                None
            })
        };

        match oauth_error {
            Some(message) => {
                self.transcript.push(Sender::System, message);
            }
            None if self.transcript.is_empty() => {
                let note = if view.is_loading {
                    LOADING_NOTE
                } else if !view.is_signed_in && view.error.is_none() {
                    CONNECT_NOTE
                } else {
                    ""
                };
                self.transcript
                    .push(Sender::Assistant, format!("{}{}", GREETING, note));
            }
            None => {}
        }

        if let Some(ref error) = view.error {
            let shown = self
                .transcript
                .any_from(Sender::System, |text| text.contains("Error:"));
            if !shown {
                self.transcript
                    .push(Sender::System, format!("Error: {}", error));
            }
        }

        self.transcript.len() - before
    }

    /// Answers `input` and returns the reply, or `None` for blank input.
    pub async fn respond(&mut self, input: &str, view: &SessionView) -> Option<&ChatMessage> {
        let now = Utc::now().with_timezone(&self.timezone);
        self.respond_at(input, view, now).await
    }

    pub async fn respond_at(
        &mut self,
        input: &str,
        view: &SessionView,
        now: DateTime<Tz>,
    ) -> Option<&ChatMessage> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let history = self.transcript.history();
        self.transcript.push(Sender::User, input);

        let mut reply = self.generator.generate(input, &history).await;

        if wants_to_schedule(input) {
            let note = match (view.is_signed_in, view.calendar.as_deref()) {
                (true, Some(calendar)) => {
                    let result = schedule_event(input, calendar, now).await;
                    format!("[Calendar] {}", result)
                }
                (false, _) => SIGN_IN_FIRST.to_string(),
                (true, None) => CALENDAR_NOT_READY.to_string(),
            };
            reply.push_str("\n\n");
            reply.push_str(&note);
        }

        if reply.is_empty() {
            reply = EMPTY_REPLY.to_string();
        }

        Some(self.transcript.push(Sender::Assistant, reply))
    }
}
