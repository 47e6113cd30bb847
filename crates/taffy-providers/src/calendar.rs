//! The calendar capability.
//!
//! [`CalendarApi`] is what the scheduler consumes: insertion into a calendar
//! plus the single "current token" the capability authenticates with. The
//! Google implementation is [`crate::google::GoogleCalendarClient`]; tests
//! supply their own.

use std::future::Future;
use std::pin::Pin;

use taffy_core::{EventResource, EventResult};

use crate::error::ProviderResult;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Calendar id for the signed-in user's own calendar.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Operations available once the calendar client is initialized.
pub trait CalendarApi: Send + Sync {
    /// Inserts `event` into the calendar identified by `calendar_id`.
    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a EventResource,
    ) -> BoxFuture<'a, ProviderResult<EventResult>>;

    /// Replaces the access token used for subsequent calls.
    fn set_token(&self, token: Option<String>);

    /// Returns the access token currently in use.
    fn token(&self) -> Option<String>;
}
