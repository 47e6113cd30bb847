//! Loopback consent: the authorization code flow with PKCE.
//!
//! Stands in for the consent popup of a browser app:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a listener on `127.0.0.1` within the configured port range
//! 3. Open the user's browser on Google's consent page
//! 4. Receive the redirect with the authorization code on the listener
//! 5. Exchange the code (with the verifier) for an access token
//!
//! The listener waits until the browser comes back; there is no deadline.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::calendar::BoxFuture;

use super::config::{GoogleConfig, OAuthCredentials};
use super::token_client::{ConsentFlow, ConsentRequest, GrantError, GrantErrorKind, TokenResponse};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

const CALLBACK_ROUTE: &str = "/callback";

/// [`ConsentFlow`] that completes in the user's browser.
#[derive(Debug, Clone)]
pub struct LoopbackConsent {
    credentials: OAuthCredentials,
    auth_url: String,
    token_url: String,
    port_range: (u16, u16),
    open_browser: bool,
    http_client: reqwest::Client,
}

impl LoopbackConsent {
    pub fn new(config: &GoogleConfig, http_client: reqwest::Client) -> Self {
        Self {
            credentials: config.credentials.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            port_range: config.loopback_port_range,
            open_browser: true,
            http_client,
        }
    }

    /// Only print the consent URL instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn authorize(&self, request: &ConsentRequest) -> Result<TokenResponse, GrantError> {
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_ROUTE);
        let auth_url = pkce.build_auth_url(&self.auth_url, request, &redirect_uri);

        debug!("authorization URL: {}", auth_url);
        if !self.open_browser || open::that(&auth_url).is_err() {
            if self.open_browser {
                warn!("failed to open browser");
            }
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
        }

        let callback = wait_for_callback(&listener).await?;

        if let Some(error) = callback.error {
            info!(%error, "consent was not granted");
            return Ok(TokenResponse::denied(error));
        }
        if callback.state.as_deref() != Some(pkce.state.as_str()) {
            return Err(GrantError::unknown("OAuth state mismatch"));
        }
        let Some(code) = callback.code else {
            return Ok(TokenResponse::denied("missing authorization code"));
        };

        info!("received authorization code, exchanging for token");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri).await
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, GrantError> {
        let mut params = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        if !self.credentials.client_secret.is_empty() {
            params.push(("client_secret", self.credentials.client_secret.as_str()));
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GrantError::unknown(format!("token exchange request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GrantError::unknown(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(GrantError::unknown(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| GrantError::unknown(format!("invalid token response: {}", e)))
    }
}

impl ConsentFlow for LoopbackConsent {
    fn request<'a>(
        &'a self,
        request: &'a ConsentRequest,
    ) -> BoxFuture<'a, Result<TokenResponse, GrantError>> {
        Box::pin(self.authorize(request))
    }
}

/// Binds the first free port in the range.
async fn bind_loopback(port_range: (u16, u16)) -> Result<(TcpListener, u16), GrantError> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!("bound loopback listener on port {}", port);
            return Ok((listener, port));
        }
    }
    Err(GrantError::new(
        GrantErrorKind::PopupFailedToOpen,
        format!(
            "no available port in range {}-{}",
            port_range.0, port_range.1
        ),
    ))
}

/// Query parameters of the authorization redirect.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Accepts connections until one hits the callback route.
async fn wait_for_callback(listener: &TcpListener) -> Result<CallbackParams, GrantError> {
    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| GrantError::unknown(format!("failed to accept connection: {}", e)))?;
        if let Some(params) = handle_connection(stream).await {
            return Ok(params);
        }
    }
}

async fn handle_connection(mut stream: TcpStream) -> Option<CallbackParams> {
    let mut request_line = String::new();
    BufReader::new(&mut stream)
        .read_line(&mut request_line)
        .await
        .ok()?;

    let params = parse_request_line(&request_line)?;

    let response = if params.code.is_some() && params.error.is_none() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Taffy is connected</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authorization Failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;

    Some(params)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_request_line(line: &str) -> Option<CallbackParams> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let (route, query) = target.split_once('?').unwrap_or((target, ""));
    if route != CALLBACK_ROUTE {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let slot = match key.as_ref() {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            _ => continue,
        };
        slot.get_or_insert_with(|| value.into_owned());
    }
    Some(params)
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the authorization URL for a code grant.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        request: &ConsentRequest,
        redirect_uri: &str,
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            include_granted_scopes=true&prompt={}",
            auth_url,
            urlencoding::encode(&request.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&request.scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
            request.prompt.as_str(),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::config::GOOGLE_AUTH_URL;
    use crate::google::token_client::Prompt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ConsentRequest {
        ConsentRequest {
            client_id: "test-client.apps.googleusercontent.com".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar.events".to_string()],
            prompt: Prompt::Consent,
        }
    }

    #[test]
    fn pkce_verifier_length() {
        // Base64 encoding of 32 bytes = 43 characters (no padding)
        assert_eq!(PkceFlow::new().verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        assert_eq!(
            PkceFlow::compute_challenge("test-verifier-string"),
            PkceFlow::compute_challenge("test-verifier-string")
        );
    }

    #[test]
    fn pkce_values_are_random() {
        let a = PkceFlow::new();
        let b = PkceFlow::new();
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.state, b.state);
    }

    #[test]
    fn auth_url_format() {
        let url = PkceFlow::new().build_auth_url(
            GOOGLE_AUTH_URL,
            &request(),
            "http://127.0.0.1:8080/callback",
        );
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("prompt=consent"));
    }

    #[test]
    fn request_line_parsing() {
        let params =
            parse_request_line("GET /callback?code=4%2Fabc&state=xyz HTTP/1.1\r\n").unwrap();
        assert_eq!(params.code.as_deref(), Some("4/abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.error, None);

        let denied = parse_request_line("GET /callback?error=access_denied HTTP/1.1").unwrap();
        assert_eq!(denied.error.as_deref(), Some("access_denied"));

        assert!(parse_request_line("GET /favicon.ico HTTP/1.1").is_none());
        assert!(parse_request_line("POST /callback?code=x HTTP/1.1").is_none());
    }

    #[tokio::test]
    async fn loopback_receives_callback() {
        let (listener, port) = bind_loopback((18400, 18420)).await.unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream
                .write_all(b"GET /callback?code=abc&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
        });

        let params = wait_for_callback(&listener).await.unwrap();
        browser.await.unwrap();
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn code_exchange_parses_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=v"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.abc",
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/calendar.events"
            })))
            .mount(&server)
            .await;

        let config = GoogleConfig::new(
            OAuthCredentials::new("test-client.apps.googleusercontent.com", "secret"),
            "key",
        )
        .with_identity_endpoints(
            GOOGLE_AUTH_URL,
            format!("{}/token", server.uri()),
            format!("{}/revoke", server.uri()),
        );
        let consent = LoopbackConsent::new(&config, reqwest::Client::new()).without_browser();

        let token = consent
            .exchange_code("code", "v", "http://127.0.0.1:8080/callback")
            .await
            .unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn failed_exchange_is_grant_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let config = GoogleConfig::new(
            OAuthCredentials::new("test-client.apps.googleusercontent.com", ""),
            "key",
        )
        .with_identity_endpoints(GOOGLE_AUTH_URL, server.uri(), server.uri());
        let consent = LoopbackConsent::new(&config, reqwest::Client::new());

        let err = consent
            .exchange_code("code", "v", "http://127.0.0.1:8080/callback")
            .await
            .unwrap_err();
        assert_eq!(err.kind, GrantErrorKind::Unknown);
        assert!(err.message.contains("invalid_grant"));
    }
}
