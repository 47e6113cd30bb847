//! Google Calendar API client.
//!
//! Built from the discovery document by
//! [`initialize_calendar_client`](super::discovery::initialize_calendar_client).
//! Every call carries the API key; the bearer token is whatever was last set
//! through [`CalendarApi::set_token`].

use std::sync::{PoisonError, RwLock};

use serde::Deserialize;
use taffy_core::{EventResource, EventResult};
use tracing::{debug, warn};

use crate::calendar::{BoxFuture, CalendarApi};
use crate::error::{ProviderError, ProviderResult};

use super::discovery::InsertEndpoint;

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_key: String,
    insert: InsertEndpoint,
    access_token: RwLock<Option<String>>,
}

/// Error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl GoogleCalendarClient {
    pub fn new(
        http_client: reqwest::Client,
        api_key: impl Into<String>,
        insert: InsertEndpoint,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            insert,
            access_token: RwLock::new(None),
        }
    }

    /// The insertion URL for `calendar_id`, without the key parameter.
    pub fn insert_url(&self, calendar_id: &str) -> String {
        self.insert.url(calendar_id)
    }

    /// Inserts an event and returns the created resource.
    pub async fn insert(
        &self,
        calendar_id: &str,
        event: &EventResource,
    ) -> ProviderResult<EventResult> {
        let url = self.insert_url(calendar_id);
        debug!(%url, summary = %event.summary, "inserting event");

        let mut request = self
            .http_client
            .request(self.insert.method().clone(), &url)
            .query(&[("key", self.api_key.as_str())])
            .json(event);

        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            ProviderError::network(message)
                .with_provider("google")
                .with_source(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e))
                .with_provider("google")
                .with_source(e)
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            warn!(status = status.as_u16(), %message, "event insertion failed");
            return Err(
                ProviderError::from_api_status(status.as_u16(), message).with_provider("google")
            );
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
                .with_provider("google")
                .with_source(e)
        })
    }
}

impl CalendarApi for GoogleCalendarClient {
    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a EventResource,
    ) -> BoxFuture<'a, ProviderResult<EventResult>> {
        Box::pin(self.insert(calendar_id, event))
    }

    fn set_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
