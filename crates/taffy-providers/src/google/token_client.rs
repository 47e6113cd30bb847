//! Interactive token client.
//!
//! A [`TokenClient`] is bound to a client id, a scope set and two callbacks.
//! Each [`request_access_token`](TokenClient::request_access_token) runs a
//! [`ConsentFlow`] in the background and reports the outcome through exactly
//! one of the callbacks.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::calendar::BoxFuture;
use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;
use super::loader::{SdkEnvironment, SdkKind};

/// Advisory shown while the identity SDK is still missing.
pub const IDENTITY_NOT_LOADED: &str = "Google Sign-In library not fully loaded. Please wait.";

/// How the consent screen should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prompt {
    /// Always show the consent screen.
    #[default]
    Consent,
    /// Let the user pick an account.
    SelectAccount,
    /// Reuse an existing grant without UI when possible.
    None,
}

impl Prompt {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
            Self::None => "none",
        }
    }
}

/// A token grant as delivered to the success callback.
///
/// Google reports a denial here too, as a response without a token and with
/// `error` set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TokenResponse {
    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn has_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Why a consent flow ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantErrorKind {
    /// The user dismissed the consent window.
    PopupClosed,
    /// The consent window could not be opened.
    PopupFailedToOpen,
    Unknown,
}

impl GrantErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PopupClosed => "popup_closed",
            Self::PopupFailedToOpen => "popup_failed_to_open",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GrantErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consent flow failure, delivered to the error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantError {
    pub kind: GrantErrorKind,
    pub message: String,
}

impl GrantError {
    pub fn new(kind: GrantErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn popup_closed() -> Self {
        Self::new(GrantErrorKind::PopupClosed, "consent window closed")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::Unknown, message)
    }
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Parameters of one consent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub prompt: Prompt,
}

/// Obtains an access token from the user interactively.
pub trait ConsentFlow: Send + Sync {
    fn request<'a>(
        &'a self,
        request: &'a ConsentRequest,
    ) -> BoxFuture<'a, Result<TokenResponse, GrantError>>;
}

pub type TokenCallback = Arc<dyn Fn(TokenResponse) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(GrantError) + Send + Sync>;

/// Requests access tokens for a fixed client id and scope set.
pub struct TokenClient {
    client_id: String,
    scopes: Vec<String>,
    flow: Arc<dyn ConsentFlow>,
    on_token: TokenCallback,
    on_error: ErrorCallback,
}

impl fmt::Debug for TokenClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClient")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenClient {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Starts a consent flow. The outcome arrives through the callbacks;
    /// the returned handle resolves once a callback has run.
    pub fn request_access_token(&self, prompt: Prompt) -> JoinHandle<()> {
        let request = ConsentRequest {
            client_id: self.client_id.clone(),
            scopes: self.scopes.clone(),
            prompt,
        };
        let flow = Arc::clone(&self.flow);
        let on_token = Arc::clone(&self.on_token);
        let on_error = Arc::clone(&self.on_error);

        debug!(prompt = prompt.as_str(), "requesting access token");
        tokio::spawn(async move {
            match flow.request(&request).await {
                Ok(response) => on_token(response),
                Err(e) => {
                    warn!(error = %e, "consent flow failed");
                    on_error(e)
                }
            }
        })
    }
}

/// Builds the token client once the identity SDK is attached.
///
/// A missing identity SDK is an advisory
/// [`AuthInit`](crate::ProviderErrorCode::AuthInit) error, not a failure.
pub fn initialize_token_client(
    env: &SdkEnvironment,
    config: &GoogleConfig,
    flow: Arc<dyn ConsentFlow>,
    on_token: TokenCallback,
    on_error: ErrorCallback,
) -> ProviderResult<TokenClient> {
    if !env.is_attached(SdkKind::Identity) {
        return Err(ProviderError::auth_init(IDENTITY_NOT_LOADED));
    }

    config
        .credentials
        .validate()
        .map_err(ProviderError::client_init)?;
    if config.scopes.is_empty() {
        return Err(ProviderError::client_init("no OAuth scopes configured"));
    }

    info!(scopes = ?config.scopes, "token client initialized");
    Ok(TokenClient {
        client_id: config.credentials.client_id.clone(),
        scopes: config.scopes.clone(),
        flow,
        on_token,
        on_error,
    })
}

/// Revokes `token` at the identity provider.
pub async fn revoke_token(
    http_client: &reqwest::Client,
    revoke_url: &str,
    token: &str,
) -> ProviderResult<()> {
    let response = http_client
        .post(revoke_url)
        .form(&[("token", token)])
        .send()
        .await
        .map_err(|e| {
            ProviderError::network(format!("revocation request failed: {}", e)).with_source(e)
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::invalid_response(format!(
            "token revocation failed ({}): {}",
            status, body
        ))
        .with_status(status.as_u16()));
    }

    info!("token revoked");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// A consent flow that replays queued outcomes.
    #[derive(Default)]
    pub struct ScriptedConsent {
        outcomes: Mutex<Vec<Result<TokenResponse, GrantError>>>,
        pub requests: Mutex<Vec<ConsentRequest>>,
    }

    impl ScriptedConsent {
        pub fn new(outcomes: Vec<Result<TokenResponse, GrantError>>) -> Self {
            let mut outcomes = outcomes;
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn granting(token: &str) -> Self {
            Self::new(vec![Ok(TokenResponse {
                access_token: token.to_string(),
                expires_in: Some(3599),
                ..TokenResponse::default()
            })])
        }
    }

    impl ConsentFlow for ScriptedConsent {
        fn request<'a>(
            &'a self,
            request: &'a ConsentRequest,
        ) -> BoxFuture<'a, Result<TokenResponse, GrantError>> {
            self.requests.lock().unwrap().push(request.clone());
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(GrantError::popup_closed()));
            Box::pin(async move { outcome })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedConsent;
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use crate::google::loader::LoadedSdk;
    use std::sync::Mutex;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> GoogleConfig {
        GoogleConfig::new(
            OAuthCredentials::new("test.apps.googleusercontent.com", ""),
            "key",
        )
    }

    fn identity_env() -> SdkEnvironment {
        let mut env = SdkEnvironment::new();
        env.attach(LoadedSdk {
            kind: SdkKind::Identity,
            source_url: "gis".to_string(),
            size: 1,
        });
        env
    }

    type Seen = Arc<Mutex<Vec<String>>>;

    fn callbacks(seen: &Seen) -> (TokenCallback, ErrorCallback) {
        let tokens = Arc::clone(seen);
        let errors = Arc::clone(seen);
        (
            Arc::new(move |r: TokenResponse| {
                tokens.lock().unwrap().push(format!("token:{}", r.access_token))
            }),
            Arc::new(move |e: GrantError| errors.lock().unwrap().push(format!("error:{}", e.kind))),
        )
    }

    #[test]
    fn missing_identity_sdk_is_advisory() {
        let seen = Seen::default();
        let (on_token, on_error) = callbacks(&seen);
        let err = initialize_token_client(
            &SdkEnvironment::new(),
            &config(),
            Arc::new(ScriptedConsent::default()),
            on_token,
            on_error,
        )
        .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthInit);
        assert_eq!(err.message(), IDENTITY_NOT_LOADED);
    }

    #[test]
    fn invalid_client_id_fails_construction() {
        let seen = Seen::default();
        let (on_token, on_error) = callbacks(&seen);
        let bad = GoogleConfig::new(OAuthCredentials::new("nope", ""), "key");
        let err = initialize_token_client(
            &identity_env(),
            &bad,
            Arc::new(ScriptedConsent::default()),
            on_token,
            on_error,
        )
        .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ClientInit);
    }

    #[tokio::test]
    async fn grant_goes_to_token_callback() {
        let seen = Seen::default();
        let (on_token, on_error) = callbacks(&seen);
        let flow = Arc::new(ScriptedConsent::granting("ya29.token"));
        let client =
            initialize_token_client(&identity_env(), &config(), flow.clone(), on_token, on_error)
                .unwrap();

        client.request_access_token(Prompt::Consent).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["token:ya29.token".to_string()]);
        let requests = flow.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, Prompt::Consent);
        assert_eq!(requests[0].scopes, config().scopes);
    }

    #[tokio::test]
    async fn failure_goes_to_error_callback() {
        let seen = Seen::default();
        let (on_token, on_error) = callbacks(&seen);
        let client = initialize_token_client(
            &identity_env(),
            &config(),
            Arc::new(ScriptedConsent::new(vec![Err(GrantError::popup_closed())])),
            on_token,
            on_error,
        )
        .unwrap();

        client.request_access_token(Prompt::Consent).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["error:popup_closed".to_string()]);
    }

    #[test]
    fn denial_response_has_no_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"error": "access_denied"}"#).unwrap();
        assert!(!response.has_token());
        assert_eq!(response, TokenResponse::denied("access_denied"));
    }

    #[tokio::test]
    async fn revoke_posts_token_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string("token=abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        revoke_token(
            &reqwest::Client::new(),
            &format!("{}/revoke", server.uri()),
            "abc123",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn revoke_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_token"))
            .mount(&server)
            .await;

        let err = revoke_token(
            &reqwest::Client::new(),
            &format!("{}/revoke", server.uri()),
            "gone",
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
