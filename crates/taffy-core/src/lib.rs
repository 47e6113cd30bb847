//! Core types: event resources, time-of-day parsing, chat transcript, tracing

pub mod event;
pub mod message;
pub mod time;
pub mod tracing;

pub use event::{EventDateTime, EventResource, EventResult, EventResourceError};
pub use message::{ChatMessage, Role, Sender, Transcript, Turn};
pub use time::{TimeOfDay, extract_time_of_day, next_day, resolve_local};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
