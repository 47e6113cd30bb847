//! Calendar API discovery document.
//!
//! The calendar client is not hard-coded against an endpoint: the discovery
//! document tells us where `events.insert` lives and which verb it takes.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;

/// The subset of a discovery document needed to insert events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub service_path: Option<String>,
    #[serde(default)]
    pub resources: HashMap<String, DiscoveryResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryResource {
    #[serde(default)]
    pub methods: HashMap<String, DiscoveryMethod>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMethod {
    pub path: String,
    pub http_method: String,
}

/// Resolved location of `events.insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertEndpoint {
    /// Absolute URL with a `{calendarId}` placeholder.
    template: String,
    method: reqwest::Method,
}

impl InsertEndpoint {
    pub fn new(template: impl Into<String>, method: reqwest::Method) -> Self {
        Self {
            template: template.into(),
            method,
        }
    }

    pub fn method(&self) -> &reqwest::Method {
        &self.method
    }

    /// Expands the URL for `calendar_id`.
    pub fn url(&self, calendar_id: &str) -> String {
        self.template
            .replace("{calendarId}", &urlencoding::encode(calendar_id))
    }
}

impl DiscoveryDocument {
    /// Locates `resources.events.methods.insert`.
    pub fn insert_endpoint(&self) -> ProviderResult<InsertEndpoint> {
        let root_url = self
            .root_url
            .as_deref()
            .ok_or_else(|| ProviderError::client_init("discovery document has no rootUrl"))?;
        let service_path = self.service_path.as_deref().unwrap_or_default();

        let insert = self
            .resources
            .get("events")
            .and_then(|r| r.methods.get("insert"))
            .ok_or_else(|| {
                ProviderError::client_init("discovery document does not describe events.insert")
            })?;

        let method = reqwest::Method::from_bytes(insert.http_method.as_bytes()).map_err(|e| {
            ProviderError::client_init(format!("invalid httpMethod {:?}", insert.http_method))
                .with_source(e)
        })?;

        Ok(InsertEndpoint::new(
            format!("{}{}{}", root_url, service_path, insert.path),
            method,
        ))
    }
}

/// Fetches and parses the discovery document at `url`.
pub async fn fetch_discovery(
    http_client: &reqwest::Client,
    url: &str,
) -> ProviderResult<DiscoveryDocument> {
    debug!(url, "fetching discovery document");

    let response = http_client.get(url).send().await.map_err(|e| {
        ProviderError::discovery_fetch(format!("Failed to fetch discovery doc: {}", e))
            .with_source(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::discovery_fetch(format!(
            "Failed to fetch discovery doc: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ))
        .with_status(status.as_u16()));
    }

    let body = response.text().await.map_err(|e| {
        ProviderError::discovery_fetch(format!("failed to read discovery doc: {}", e))
            .with_source(e)
    })?;

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::discovery_fetch(format!("failed to parse discovery doc: {}", e))
            .with_source(e)
    })
}

/// Fetches the discovery document and builds the calendar capability.
pub async fn initialize_calendar_client(
    http_client: reqwest::Client,
    config: &GoogleConfig,
) -> ProviderResult<GoogleCalendarClient> {
    if config.api_key.trim().is_empty() {
        return Err(ProviderError::client_init("API key is not configured"));
    }

    let document = fetch_discovery(&http_client, &config.discovery_url).await?;
    let endpoint = document.insert_endpoint()?;
    info!(url = %endpoint.url("primary"), "calendar client initialized");

    Ok(GoogleCalendarClient::new(
        http_client,
        config.api_key.clone(),
        endpoint,
    ))
}

#[cfg(test)]
pub(crate) fn discovery_fixture(root_url: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": "discovery#restDescription",
        "name": "calendar",
        "version": "v3",
        "rootUrl": root_url,
        "servicePath": "calendar/v3/",
        "resources": {
            "events": {
                "methods": {
                    "insert": {
                        "id": "calendar.events.insert",
                        "path": "calendars/{calendarId}/events",
                        "httpMethod": "POST"
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, api_key: &str) -> GoogleConfig {
        GoogleConfig::new(
            OAuthCredentials::new("test.apps.googleusercontent.com", ""),
            api_key,
        )
        .with_discovery_url(format!("{}/discovery/v1/apis/calendar/v3/rest", server.uri()))
    }

    #[test]
    fn endpoint_from_fixture() {
        let doc: DiscoveryDocument =
            serde_json::from_value(discovery_fixture("https://www.googleapis.com/")).unwrap();
        let endpoint = doc.insert_endpoint().unwrap();
        assert_eq!(endpoint.method(), &reqwest::Method::POST);
        assert_eq!(
            endpoint.url("primary"),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events"
        );
        assert_eq!(
            endpoint.url("team@group.calendar.google.com"),
            "https://www.googleapis.com/calendar/v3/calendars/team%40group.calendar.google.com/events"
        );
    }

    #[test]
    fn missing_insert_method_is_client_init_error() {
        let doc: DiscoveryDocument = serde_json::from_value(serde_json::json!({
            "rootUrl": "https://www.googleapis.com/",
            "servicePath": "calendar/v3/",
            "resources": {"calendarList": {"methods": {}}}
        }))
        .unwrap();
        assert_eq!(
            doc.insert_endpoint().unwrap_err().code(),
            ProviderErrorCode::ClientInit
        );

        let doc: DiscoveryDocument = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(
            doc.insert_endpoint().unwrap_err().code(),
            ProviderErrorCode::ClientInit
        );
    }

    #[tokio::test]
    async fn initializes_from_served_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/v1/apis/calendar/v3/rest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(discovery_fixture(&format!("{}/", server.uri()))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = initialize_calendar_client(reqwest::Client::new(), &config(&server, "key"))
            .await
            .unwrap();
        assert_eq!(
            client.insert_url("primary"),
            format!("{}/calendar/v3/calendars/primary/events", server.uri())
        );
    }

    #[tokio::test]
    async fn http_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = initialize_calendar_client(reqwest::Client::new(), &config(&server, "key"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::DiscoveryFetch);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message(), "Failed to fetch discovery doc: 404 Not Found");
    }

    #[tokio::test]
    async fn malformed_document_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = initialize_calendar_client(reqwest::Client::new(), &config(&server, "key"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::DiscoveryFetch);
    }

    #[tokio::test]
    async fn empty_api_key_is_rejected_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = initialize_calendar_client(reqwest::Client::new(), &config(&server, " "))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ClientInit);
    }
}
