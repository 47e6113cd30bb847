//! Google session configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// SDK bundle endpoints.
pub const GAPI_BUNDLE_URL: &str = "https://apis.google.com/js/api.js";
pub const GIS_BUNDLE_URL: &str = "https://accounts.google.com/gsi/client";

/// Calendar API v3 discovery document.
pub const DISCOVERY_DOC_URL: &str = "https://www.googleapis.com/discovery/v1/apis/calendar/v3/rest";

/// Identity endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Scope for creating events.
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
/// Read scope, requested alongside the write scope.
pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Route that receives the implicit-grant redirect.
pub const CALLBACK_PATH: &str = "/oauth2callback";

/// OAuth 2.0 client registration.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The client secret. Desktop clients need it for the code exchange;
    /// it may be empty for clients that only use the redirect grant.
    pub client_secret: String,
}

/// Structure of Google's credentials JSON download.
#[derive(Debug, Deserialize)]
struct GoogleCredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {}", e))?;
        Self::from_json(&content)
    }

    /// Parses the `{"installed": {...}}`, `{"web": {...}}` or flat layout.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: GoogleCredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        match file.client_id {
            Some(client_id) => Ok(Self::new(
                client_id,
                file.client_secret.unwrap_or_default(),
            )),
            None => Err(
                "credentials file must contain an 'installed'/'web' section or a root 'client_id'"
                    .to_string(),
            ),
        }
    }

    /// Checks the client id looks like a Google OAuth client id.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        Ok(())
    }
}

/// Configuration for the session manager and its Google capabilities.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,

    /// API key passed to the calendar client on every call.
    pub api_key: String,

    pub discovery_url: String,
    pub gapi_bundle_url: String,
    pub gis_bundle_url: String,

    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,

    /// Scopes requested by the token client.
    pub scopes: Vec<String>,

    /// Where the redirect grant lands; its path is [`CALLBACK_PATH`].
    pub redirect_uri: String,

    /// Port range for the loopback consent listener.
    pub loopback_port_range: (u16, u16),

    /// Optional HTTP timeout. Unset by default: a stalled request leaves
    /// the session loading rather than failing it.
    pub timeout: Option<Duration>,

    pub user_agent: String,
}

impl GoogleConfig {
    /// Creates a configuration with Google's production endpoints.
    pub fn new(credentials: OAuthCredentials, api_key: impl Into<String>) -> Self {
        Self {
            credentials,
            api_key: api_key.into(),
            discovery_url: DISCOVERY_DOC_URL.to_string(),
            gapi_bundle_url: GAPI_BUNDLE_URL.to_string(),
            gis_bundle_url: GIS_BUNDLE_URL.to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            scopes: vec![
                CALENDAR_EVENTS_SCOPE.to_string(),
                CALENDAR_READONLY_SCOPE.to_string(),
            ],
            redirect_uri: format!("http://localhost:5173{}", CALLBACK_PATH),
            loopback_port_range: (8080, 8090),
            timeout: None,
            user_agent: format!("taffy/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    /// Sets both SDK bundle URLs.
    pub fn with_bundle_urls(mut self, gapi: impl Into<String>, gis: impl Into<String>) -> Self {
        self.gapi_bundle_url = gapi.into();
        self.gis_bundle_url = gis.into();
        self
    }

    /// Sets the authorization, token and revocation endpoints.
    pub fn with_identity_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        revoke_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self.revoke_url = revoke_url.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the shared HTTP client for all Google calls.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Builds the URL that starts the redirect (implicit) grant.
    ///
    /// Google answers on [`redirect_uri`](Self::redirect_uri) with the token
    /// in the URL fragment.
    pub fn implicit_grant_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=token&scope={}&\
            include_granted_scopes=true&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }

        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err("invalid loopback port range".to_string());
        }

        url::Url::parse(&self.redirect_uri)
            .map_err(|e| format!("invalid redirect_uri: {}", e))?;

        Ok(())
    }
}
