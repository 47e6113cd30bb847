//! Error types for the Google session and calendar operations.
//!
//! Every failure carries a [`ProviderErrorCode`] from a closed taxonomy. The
//! code decides how an error is surfaced: load failures end the session
//! manager, redirect failures go through the one-shot error slot, and
//! scheduling failures are reported inline with the request.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// An SDK bundle could not be fetched.
    ScriptLoad,
    /// The discovery document could not be fetched or parsed.
    DiscoveryFetch,
    /// The calendar client could not be built from the discovery document.
    ClientInit,
    /// The identity SDK is not attached yet. Advisory; resolves on its own.
    AuthInit,
    /// The user denied consent or dismissed the consent window.
    AuthDenied,
    /// The redirect fragment could not be interpreted.
    RedirectParse,
    /// The calendar API rejected the credentials (401).
    SessionExpired,
    /// The calendar API refused the operation (403).
    PermissionDenied,
    /// Any other calendar API failure.
    ScheduleFailed,
    /// Connection failed before a response arrived.
    NetworkError,
    /// A response arrived but could not be parsed.
    InvalidResponse,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// The session store could not be read or written.
    StorageError,
    /// Unexpected internal state.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns true for errors that end the session manager's loading phase.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::ScriptLoad | Self::DiscoveryFetch | Self::ClientInit
        )
    }

    /// Returns true if the condition is expected to clear without user action.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::AuthInit)
    }

    /// Returns a stable snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScriptLoad => "script_load",
            Self::DiscoveryFetch => "discovery_fetch",
            Self::ClientInit => "client_init",
            Self::AuthInit => "auth_init",
            Self::AuthDenied => "auth_denied",
            Self::RedirectParse => "redirect_parse",
            Self::SessionExpired => "session_expired",
            Self::PermissionDenied => "permission_denied",
            Self::ScheduleFailed => "schedule_failed",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from the session manager or the calendar API.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    /// Human-readable message; for API errors this is the provider's own text.
    message: String,
    /// HTTP status, when the error came from a response.
    status: Option<u16>,
    /// The provider that generated this error (e.g. "google").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            provider: None,
            source: None,
        }
    }

    pub fn script_load(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ScriptLoad, message)
    }

    pub fn discovery_fetch(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::DiscoveryFetch, message)
    }

    pub fn client_init(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ClientInit, message)
    }

    pub fn auth_init(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthInit, message)
    }

    pub fn auth_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthDenied, message)
    }

    pub fn redirect_parse(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RedirectParse, message)
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::SessionExpired, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PermissionDenied, message)
    }

    pub fn schedule_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ScheduleFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::StorageError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Maps a failed calendar API response to the matching code.
    ///
    /// 401 is an expired or invalid session, 403 a permission problem,
    /// anything else a generic scheduling failure.
    pub fn from_api_status(status: u16, message: impl Into<String>) -> Self {
        let code = match status {
            401 => ProviderErrorCode::SessionExpired,
            403 => ProviderErrorCode::PermissionDenied,
            _ => ProviderErrorCode::ScheduleFailed,
        };
        Self::new(code, message).with_status(status)
    }

    /// Sets the HTTP status for this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failures() {
        assert!(ProviderErrorCode::ScriptLoad.is_load_failure());
        assert!(ProviderErrorCode::DiscoveryFetch.is_load_failure());
        assert!(ProviderErrorCode::ClientInit.is_load_failure());
        assert!(!ProviderErrorCode::AuthInit.is_load_failure());
        assert!(!ProviderErrorCode::SessionExpired.is_load_failure());
    }

    #[test]
    fn only_auth_init_is_advisory() {
        assert!(ProviderErrorCode::AuthInit.is_advisory());
        assert!(!ProviderErrorCode::AuthDenied.is_advisory());
        assert!(!ProviderErrorCode::ScriptLoad.is_advisory());
    }

    #[test]
    fn api_status_mapping() {
        let err = ProviderError::from_api_status(401, "Invalid Credentials");
        assert_eq!(err.code(), ProviderErrorCode::SessionExpired);
        assert_eq!(err.status(), Some(401));

        let err = ProviderError::from_api_status(403, "Forbidden");
        assert_eq!(err.code(), ProviderErrorCode::PermissionDenied);

        let err = ProviderError::from_api_status(500, "Backend Error");
        assert_eq!(err.code(), ProviderErrorCode::ScheduleFailed);
        assert_eq!(err.message(), "Backend Error");
    }

    #[test]
    fn display_includes_provider_and_status() {
        let err = ProviderError::from_api_status(403, "Forbidden").with_provider("google");
        let display = err.to_string();
        assert!(display.contains("[google]"));
        assert!(display.contains("permission_denied"));
        assert!(display.contains("Forbidden"));
        assert!(display.contains("HTTP 403"));
    }

    #[test]
    fn source_is_kept() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::storage("failed to write token").with_source(io_err);
        assert!(err.source().is_some());
    }
}
