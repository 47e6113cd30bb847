//! Google session lifecycle and calendar scheduling.
//!
//! - [`google::SessionManager`] - loads both SDK capabilities, tracks the
//!   aggregate load state and the signed-in flag
//! - [`google::RedirectCallback`] - one-shot handler for the redirect grant
//! - [`CalendarApi`] - the calendar capability the scheduler consumes
//! - [`schedule_event`] - turns free text into an inserted calendar event
//! - [`ProviderError`] - error taxonomy shared by all of the above
//!
//! # Architecture
//!
//! ```text
//!   api.js bundle          gsi/client bundle
//!        │                        │
//!        ▼                        ▼
//!  discovery doc            TokenClient
//!        │                        │
//!        ▼                        │
//!  GoogleCalendarClient           │
//!        │    SessionEvent (mpsc) │
//!        └──────────┬─────────────┘
//!                   ▼
//!             SessionState ──watch──▶ SessionSnapshot
//! ```

pub mod calendar;
pub mod error;
pub mod google;
pub mod schedule;

pub use calendar::{BoxFuture, CalendarApi, PRIMARY_CALENDAR};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use schedule::{ScheduleFailure, build_event, schedule_event};
