//! Redirect (implicit) grant callback.
//!
//! Google sends the browser back to `/oauth2callback` with the grant in the
//! URL fragment. [`RedirectCallback`] reads that fragment once, persists the
//! token or an error message to the [`SessionStore`], and always sends the
//! user back to the root path.

use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

use super::store::{SessionStore, StoredToken};

/// Where every callback ends up.
pub const ROOT_PATH: &str = "/";

/// A replace-navigation to `location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

impl Redirect {
    pub fn root() -> Self {
        Self {
            location: ROOT_PATH.to_string(),
        }
    }
}

/// What a fragment amounts to, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The provider sent an error; carries the message for the error slot.
    Denied(String),
    /// A token with an integer lifetime.
    Token(StoredToken),
    /// `expires_in` was present but not an integer.
    InvalidExpiry,
    /// Only one of `access_token` and `expires_in` arrived.
    Incomplete,
    /// No fragment, or nothing in it relevant to the grant.
    Empty,
}

impl RedirectOutcome {
    /// The message destined for the one-shot error slot, if any.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Denied(message) => Some(message.clone()),
            Self::InvalidExpiry => Some(
                "Error processing Google Sign-In callback: Invalid expires_in value received."
                    .to_string(),
            ),
            Self::Incomplete => Some("Failed to get token from Google redirect.".to_string()),
            Self::Token(_) | Self::Empty => None,
        }
    }
}

/// Fragment values this handler reads, first occurrence of each key.
#[derive(Debug, Default)]
struct GrantParams {
    access_token: Option<String>,
    expires_in: Option<String>,
    error: Option<String>,
}

impl GrantParams {
    fn parse(fragment: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            // Empty values count as absent.
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "access_token" => &mut params.access_token,
                "expires_in" => &mut params.expires_in,
                "error" => &mut params.error,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// One-shot processor for a redirect callback URL.
///
/// [`process`](Self::process) takes `self`, so a callback cannot be handled
/// twice.
#[derive(Debug)]
pub struct RedirectCallback {
    fragment: Option<String>,
}

impl RedirectCallback {
    /// Captures the fragment of `url`. The query string is ignored.
    pub fn from_url(url: &str) -> ProviderResult<Self> {
        let parsed = Url::parse(url).map_err(|e| {
            ProviderError::redirect_parse(format!("invalid callback URL: {}", e)).with_source(e)
        })?;
        Ok(Self::from_fragment(parsed.fragment()))
    }

    pub fn from_fragment(fragment: Option<&str>) -> Self {
        Self {
            fragment: fragment.filter(|f| !f.is_empty()).map(str::to_string),
        }
    }

    /// Classifies the fragment without side effects.
    pub fn outcome(&self, now_ms: i64) -> RedirectOutcome {
        let Some(fragment) = self.fragment.as_deref() else {
            return RedirectOutcome::Empty;
        };
        let params = GrantParams::parse(fragment);

        if let Some(error) = params.error {
            return RedirectOutcome::Denied(format!("Google Sign-In Error: {}", error));
        }

        let expires_in = match params.expires_in.as_deref().map(|s| s.trim().parse::<i64>()) {
            Some(Ok(seconds)) => Some(seconds),
            Some(Err(_)) => return RedirectOutcome::InvalidExpiry,
            None => None,
        };

        match (params.access_token, expires_in) {
            (Some(token), Some(seconds)) => {
                RedirectOutcome::Token(StoredToken::from_expires_in(token, seconds, now_ms))
            }
            (None, None) => RedirectOutcome::Empty,
            _ => RedirectOutcome::Incomplete,
        }
    }

    /// Applies the outcome to `store` and returns the single redirect.
    pub fn process(self, store: &SessionStore, now_ms: i64) -> Redirect {
        let outcome = self.outcome(now_ms);

        let written = match &outcome {
            RedirectOutcome::Token(token) => store.set_token(token).map(|()| {
                info!("stored token from redirect callback");
            }),
            RedirectOutcome::Empty => {
                if self.fragment.is_none() {
                    warn!("redirect callback without fragment");
                } else {
                    debug!("redirect fragment carried no grant parameters");
                }
                Ok(())
            }
            other => match other.error_message() {
                Some(message) => {
                    warn!(%message, "redirect callback failed");
                    store.set_error(&message)
                }
                None => Ok(()),
            },
        };

        if let Err(e) = written {
            error!(error = %e, "failed to persist redirect callback result");
        }

        Redirect::root()
    }
}
