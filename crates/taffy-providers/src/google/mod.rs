//! Google identity and calendar integration.
//!
//! # Grant paths
//!
//! Two ways lead to a signed-in session:
//!
//! - **Interactive consent**: [`SessionManager::sign_in`] runs the
//!   [`TokenClient`]'s [`ConsentFlow`] (by default [`LoopbackConsent`]); the
//!   token goes straight to the calendar capability.
//! - **Redirect grant**: the browser lands on `/oauth2callback` with the
//!   token in the fragment; [`RedirectCallback`] persists it to the
//!   [`SessionStore`] for the chat session to pick up.
//!
//! # Example
//!
//! ```ignore
//! use taffy_providers::google::{GoogleConfig, LoopbackConsent, OAuthCredentials, SessionManager, SessionStore};
//!
//! let config = GoogleConfig::new(
//!     OAuthCredentials::new("your-client-id.apps.googleusercontent.com", "secret"),
//!     "api-key",
//! );
//! let consent = Arc::new(LoopbackConsent::new(&config, reqwest::Client::new()));
//! let manager = SessionManager::mount(config, consent, SessionStore::new(dir))?;
//!
//! if manager.wait_until_settled().await.status() == LoadStatus::Ready {
//!     manager.sign_in().await?;
//! }
//! ```

mod client;
mod config;
mod discovery;
mod loader;
mod oauth;
mod redirect;
mod session;
mod store;
mod token_client;

pub use client::GoogleCalendarClient;
pub use config::{
    CALENDAR_EVENTS_SCOPE, CALENDAR_READONLY_SCOPE, CALLBACK_PATH, GoogleConfig, OAuthCredentials,
};
pub use discovery::{DiscoveryDocument, InsertEndpoint, fetch_discovery, initialize_calendar_client};
pub use loader::{LoadedSdk, SdkBundle, SdkEnvironment, SdkKind};
pub use oauth::{LoopbackConsent, PkceFlow};
pub use redirect::{Redirect, RedirectCallback, RedirectOutcome};
pub use session::{
    LoadState, LoadStatus, SIGN_IN_NOT_READY, SessionEvent, SessionManager, SessionSnapshot,
    SessionState,
};
pub use store::{ERROR_KEY, SessionStore, StoredToken, TOKEN_KEY, now_millis};
pub use token_client::{
    ConsentFlow, ConsentRequest, GrantError, GrantErrorKind, Prompt, TokenClient, TokenResponse,
    initialize_token_client, revoke_token,
};
